#![expect(missing_docs)]
#![expect(clippy::needless_raw_string_hashes)]

use core::fmt::Write;

use dissector::{Collector, Limits, Parser, ParserKind, parsers::FileKind};
use insta::assert_snapshot;

mod common;

/// Renders every document under a heading naming its parser.
fn transcript(cases: &[(ParserKind, &[u8])]) -> String {
    let limits = Limits::default();
    let mut out = String::new();
    for (kind, input) in cases {
        let collected = common::collect(kind, &limits, &[input]).expect("valid document");
        let parser = kind.buffered(Collector::new(), &limits, 0);
        writeln!(out, "# {}", parser.name()).unwrap();
        out.push_str(&collected.render());
    }
    out.trim_end().to_owned()
}

#[test]
fn snapshot_text_formats() {
    let out = transcript(&[
        (ParserKind::url_encoded(), b"a=1&b=x%2By+z&k%20ey=v%26w&p"),
        (
            ParserKind::header_value(),
            br#"form-data; name="f;1"; filename="a b.txt" ; x=y"#,
        ),
        (
            ParserKind::Json,
            br#"{"k":[1,"two",true,null],"m":{"x":-0.5e+3},"a":{},"n":"a\u0000b"}"#,
        ),
        (
            ParserKind::Xml,
            br#"<root><a x="1">hi</a><b/><c> t1 <d>v</d> t2 </c></root>"#,
        ),
    ]);

    assert_snapshot!(out, @r#"
    # urlencoded
    a=1
    b=x+y z
    k ey=v&w
    p=
    # hdrvalue
    form-data=
    name=f;1
    filename=a b.txt
    x=y
    # json
    k=1
    k=two
    k=true
    k=null
    m.x=-0.5e+3
    a=
    n=a@b
    # xml
    root.a.x=1
    root.a=hi
    root.b=
    root.c.d=v
    root.c=t1t2
    "#);
}

#[test]
fn snapshot_structured_formats() {
    let out = transcript(&[
        (ParserKind::Php, br#"a:2:{i:0;s:1:"x";s:1:"k";a:1:{s:1:"n";b:0;}}"#),
        (
            ParserKind::Php,
            br#"O:3:"Foo":2:{s:3:"bar";i:1;s:6:"\0*\0baz";N;}"#,
        ),
        (
            ParserKind::Graphql,
            b"{ f(ids: [1, 2], o: {k: true, e: RED}) }",
        ),
        (
            ParserKind::Multipart {
                boundary: b"X".to_vec(),
            },
            b"--X\r\nContent-Disposition: form-data; name=\"user\"\r\n\r\nadmin\r\n\
              --X\r\n\r\nplain\r\n--X--\r\n",
        ),
        (
            ParserKind::Binary,
            b"\x00\x01short\xffthis is long enough\x00\x02ab\x03another long run",
        ),
    ]);

    assert_snapshot!(out, @r#"
    # php
    0=x
    k.n=0
    # php
    Object=Foo
    bar=1
    @*@baz=
    # graphql
    f=
    ids=1
    ids=2
    o=
    k=true
    e=RED
    # multipart
    user=admin
    part-1=plain
    # binary
    text=this is long enoughanother long run
    "#);
}

#[test]
fn snapshot_markup_and_encoded_values() {
    let out = transcript(&[
        (
            ParserKind::Html,
            br#"<html><body><p id=x>Hi <b>there</b></p><img src="a.png"></body></html>"#,
        ),
        (ParserKind::Percent, b"%3Cscript%3E"),
        (ParserKind::ScreenedJson, br#""{\"a\":1}""#),
        (ParserKind::Base64Trailer(FileKind::Png), b"iVBORw0KGgo="),
    ]);

    assert_snapshot!(out, @r#"
    # html
    html.body.p.id=x
    html.body.p.b=there
    html.body.p=Hi
    html.body.img.src=a.png
    html.body.img=
    # percent
    percent=<script>
    # screened_json
    json_unscreened={"a":1}
    # trailer
    BinaryFileSkip=
    "#);
}
