//! Character data of markup elements, collected in trimmed runs.
//!
//! Text inside an element is split into runs by its child elements. Each run
//! loses its leading and trailing whitespace and the runs are concatenated,
//! so `<a> sta <b/> rt </a>` gives `a` the text `start`. Whitespace inside a
//! run is held back until the run continues, which keeps the result
//! independent of where chunks end.

use alloc::vec::Vec;

use crate::{
    error::SinkError,
    sink::{StreamSink, emit_pair},
};

pub(crate) fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

#[derive(Debug, Default)]
pub(crate) struct TextRuns {
    has_children: bool,
    /// Text reported early because it reached the value cap.
    flushed: bool,
    /// A non-space byte was seen since the last child element.
    mid_run: bool,
    text: Vec<u8>,
    /// Whitespace that is kept only if more text follows in the same run.
    pending_space: Vec<u8>,
}

impl TextRuns {
    /// A child element starts, ending the current run.
    pub(crate) fn child_opened(&mut self) {
        self.has_children = true;
        self.mid_run = false;
        self.pending_space.clear();
    }

    /// Adds one byte of character data. Text is reported under `path`
    /// whenever it reaches `cap` bytes.
    pub(crate) fn append<S: StreamSink + ?Sized>(
        &mut self,
        sink: &mut S,
        path: &[u8],
        b: u8,
        cap: usize,
    ) -> Result<(), SinkError> {
        if is_space(b) {
            if self.mid_run {
                self.pending_space.push(b);
                if self.pending_space.len() >= cap {
                    let space = core::mem::take(&mut self.pending_space);
                    self.push_text(sink, path, &space, cap)?;
                }
            }
            return Ok(());
        }
        self.mid_run = true;
        if !self.pending_space.is_empty() {
            let space = core::mem::take(&mut self.pending_space);
            self.push_text(sink, path, &space, cap)?;
        }
        self.push_text(sink, path, &[b], cap)
    }

    fn push_text<S: StreamSink + ?Sized>(
        &mut self,
        sink: &mut S,
        path: &[u8],
        bytes: &[u8],
        cap: usize,
    ) -> Result<(), SinkError> {
        for &b in bytes {
            self.text.push(b);
            if self.text.len() >= cap {
                self.flushed = true;
                emit_pair(sink, path, &self.text)?;
                self.text.clear();
            }
        }
        Ok(())
    }

    /// Whether nothing but whitespace was seen.
    pub(crate) fn is_blank(&self) -> bool {
        self.text.is_empty() && !self.flushed
    }

    /// The element closes: reports its text, or an empty value for an
    /// element with neither text nor children. Wrappers of other elements
    /// report nothing.
    pub(crate) fn close<S: StreamSink + ?Sized>(
        self,
        sink: &mut S,
        path: &[u8],
    ) -> Result<(), SinkError> {
        if !self.text.is_empty() || (!self.has_children && !self.flushed) {
            emit_pair(sink, path, &self.text)?;
        }
        Ok(())
    }
}
