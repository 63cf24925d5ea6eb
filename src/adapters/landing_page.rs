use std::fmt::Write as _;

use crate::core::route_table::RouteTable;

const STYLE: &str = "body { font-family: system-ui; max-width: 600px; margin: 50px auto; padding: 20px; }
      h1 { color: #333; }
      .endpoint { background: #f5f5f5; padding: 15px; margin: 10px 0; border-radius: 8px; }
      a { color: #0066cc; text-decoration: none; }
      a:hover { text-decoration: underline; }";

/// Render the HTML index listing every route plus the health endpoint.
pub fn render(service_name: &str, route_table: &RouteTable) -> String {
    let service_name = escape_html(service_name);
    let mut html = String::with_capacity(1024);

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n  <head>\n    <meta charset=\"utf-8\">\n    <title>{service_name}</title>\n    <style>\n      {STYLE}\n    </style>\n  </head>\n  <body>\n    <h1>{service_name}</h1>\n    <p>Available endpoints:</p>\n"
    );

    for binding in route_table.bindings() {
        push_endpoint(&mut html, binding.title(), binding.prefix());
    }
    push_endpoint(&mut html, "Health Check", "/health");

    html.push_str("  </body>\n</html>\n");
    html
}

fn push_endpoint(html: &mut String, title: &str, href: &str) {
    let title = escape_html(title);
    let href = escape_html(href);
    let _ = write!(
        html,
        "    <div class=\"endpoint\">\n      <strong>{title}:</strong><br>\n      <a href=\"{href}\">{href}</a>\n    </div>\n"
    );
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
