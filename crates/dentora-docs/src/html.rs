//! Shared HTML building blocks for printable documents.

/// Escapes text for safe interpolation into HTML body content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Wraps document body markup in the shared printable page shell.
pub fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{title}</title>\n\
         <style>\n\
         body {{ font-family: Georgia, serif; margin: 2.5rem auto; max-width: 46rem; color: #222; }}\n\
         h1 {{ font-size: 1.5rem; border-bottom: 2px solid #222; padding-bottom: 0.5rem; }}\n\
         table {{ width: 100%; border-collapse: collapse; margin: 1rem 0; }}\n\
         th, td {{ text-align: left; padding: 0.4rem 0.6rem; border-bottom: 1px solid #ccc; }}\n\
         td.num, th.num {{ text-align: right; }}\n\
         tfoot td {{ font-weight: bold; border-top: 2px solid #222; }}\n\
         .meta {{ color: #555; margin: 0.2rem 0; }}\n\
         .notes {{ margin-top: 1.5rem; font-style: italic; }}\n\
         </style>\n\
         </head>\n\
         <body>\n{body}</body>\n\
         </html>\n",
        title = escape(title),
    )
}
