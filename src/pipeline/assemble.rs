//! Combined-document assembly.
//!
//! Every fragment is preceded by a `page-number` marker; a `page-break`
//! marker goes between consecutive fragments and never after the last one.

use crate::output::Fragment;

const STYLE: &str = r#"    <style>
        .page-break {
            page-break-after: always;
            margin-bottom: 30px;
            border-bottom: 1px solid #ccc;
        }
        .page-number {
            text-align: center;
            font-weight: bold;
            margin: 20px 0;
        }
    </style>
"#;

const PAGE_BREAK: &str = "<div class=\"page-break\"></div>\n";

/// Build the combined HTML document from `fragments`, ordered by index.
///
/// The input order does not matter. Fragment markup is inserted verbatim.
pub fn assemble_document(fragments: &[Fragment], title: &str) -> String {
    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by_key(|f| f.index);

    let body_len: usize = ordered.iter().map(|f| f.markup.len() + 80).sum();
    let mut html = String::with_capacity(STYLE.len() + body_len + 256);

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"UTF-8\">\n");
    html.push_str(&format!("    <title>{}</title>\n", escape_text(title)));
    html.push_str(STYLE);
    html.push_str("</head>\n<body>\n");

    for (i, fragment) in ordered.iter().enumerate() {
        if i > 0 {
            html.push_str(PAGE_BREAK);
        }
        html.push_str(&format!(
            "<div class=\"page-number\">Page {}</div>\n",
            fragment.index
        ));
        html.push_str(&fragment.markup);
        html.push('\n');
    }

    html.push_str("</body>\n</html>");
    html
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
