use std::fmt::Write;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped in entry links. `/` is kept so directory links stay relative.
const HREF: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub const CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Renders a directory listing page for `dir_path`, the decoded request path.
pub fn listing_to_html(dir_path: &str, listing: &[String]) -> String {
    let title = html_escape::encode_text(dir_path);
    let mut html = String::with_capacity(512 + listing.len() * 64);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>Directory listing: {title}</title>");
    html.push_str(
        "<style>\n\
         body { font-family: sans-serif; margin: 2em; }\n\
         li.directory a { font-weight: bold; }\n\
         </style>\n</head>\n<body>\n",
    );
    let _ = writeln!(html, "<h1>Directory listing: {title}</h1>");
    let _ = writeln!(html, "<div class=\"total\">{} file(s) total</div>", listing.len());
    html.push_str("<ul>\n");
    if dir_path != "/" {
        html.push_str("<li class=\"directory parent\"><a href=\"../\">../</a></li>\n");
    }
    for name in listing {
        let class = if name.ends_with('/') { "directory" } else { "file" };
        let href = utf8_percent_encode(name, HREF).to_string();
        let _ = writeln!(
            html,
            "<li class=\"{class}\"><a href=\"{}\">{}</a></li>",
            html_escape::encode_double_quoted_attribute(&href),
            html_escape::encode_text(name)
        );
    }
    html.push_str("</ul>\n</body>\n</html>\n");
    html
}
