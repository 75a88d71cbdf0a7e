mod fixtures;
mod lifecycle;
