//! Static pages served by the status endpoint.

pub const STYLESHEET: &str = r#"
div.notice {
  color: green;
  font-weight: bold;
}

div.ErrorMessage {
  color: red;
  font-weight: bold;
}

div.preformatted {
  font-family: monospace;
  white-space: pre;
  display: block;
}
"#;

/// Wrap an already-escaped report body in the status page.
pub fn report_page(service_name: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="UTF-8">
        <title>Status</title>
        <link href='/{service_name}/stylesheet.css' rel='stylesheet'/>
    </head>
    <body>
        <h2>Status</h2>
        <section id="content">
            <div class="preformatted" id="report">
{body}
            </div>
        </section>
    </body>
</html>
"#
    )
}
