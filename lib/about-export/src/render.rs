//! HTML and Confluence storage rendering of about documents

use about_api::{AboutDocument, Payload};
use std::fmt::Write;

/// Escape text for inclusion in HTML/XHTML content or attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Index page linking each service's about endpoint through the API server proxy
pub fn html_index(abouts: &[AboutDocument]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n\
         <head>\n    <title>Service Documentation</title>\n</head>\n\
         <body>\n<h1>Documented services</h1>\n\
         <table style='font-size: 10pt; font-family: MONOSPACE;'>\n",
    );

    for about in abouts {
        let name = escape(&about.service.name);
        let namespace = escape(&about.service.namespace);
        let _ = write!(
            html,
            "    <tr>\n        <td><a href=\"/../../../{ns}/services/{name}:80/__/about\">{ns}.{name}</a></td>\n    </tr>\n",
            ns = namespace,
            name = name,
        );
    }

    html.push_str("</table>\n</body>\n</html>\n");
    html
}

/// Confluence storage-format table describing every service
pub fn storage_table(abouts: &[AboutDocument], updated_at: &str) -> String {
    let mut body = String::from(
        "<table><tbody>\
         <tr><th>Service</th><th>Namespace</th><th>Description</th><th>Owners</th><th>Links</th><th>Revision</th></tr>",
    );

    for about in abouts {
        let (description, owners, links, revision) = match &about.payload {
            Payload::Structured(doc) => {
                let owners = doc
                    .owners
                    .iter()
                    .map(|o| {
                        if o.slack.is_empty() {
                            escape(&o.name)
                        } else {
                            format!("{} ({})", escape(&o.name), escape(&o.slack))
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("<br/>");
                let links = doc
                    .links
                    .iter()
                    .map(|l| {
                        let text = if l.description.is_empty() {
                            &l.url
                        } else {
                            &l.description
                        };
                        format!("<a href=\"{}\">{}</a>", escape(&l.url), escape(text))
                    })
                    .collect::<Vec<_>>()
                    .join("<br/>");
                (
                    escape(&doc.description),
                    owners,
                    links,
                    escape(&doc.build_info.revision),
                )
            }
            Payload::Raw(bytes) => (
                escape(&String::from_utf8_lossy(bytes)),
                String::new(),
                String::new(),
                String::new(),
            ),
        };

        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&about.service.name),
            escape(&about.service.namespace),
            description,
            owners,
            links,
            revision,
        );
    }

    let _ = write!(
        body,
        "</tbody></table><p>Last updated {}</p>",
        escape(updated_at)
    );
    body
}
