use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};

use crate::model::{parse_hex_color, Client, ScheduledPost, DEFAULT_THEME_COLOR};

const SOCIAL_ICON_SVG: &str = r#"<svg width="16" height="16" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><rect x="2" y="2" width="20" height="20" rx="5" ry="5"></rect><path d="M16 11.37A4 4 0 1 1 12.63 8 4 4 0 0 1 16 11.37z"></path><line x1="17.5" y1="6.5" x2="17.51" y2="6.5"></line></svg>"#;

pub struct PrintInput<'a> {
    pub client: &'a Client,
    pub posts: &'a [ScheduledPost],
    pub company_name: &'a str,
    pub date: NaiveDate,
    pub print_delay: Duration,
}

/// Builds a self-contained printable page for one client's agenda. The
/// output depends only on the input.
pub fn render_document(input: &PrintInput<'_>) -> String {
    let theme = css_color(&input.client.theme_color);
    let client_name = html_escape(&input.client.name);

    let mut cards = String::new();
    for post in input.posts {
        render_card(&mut cards, post);
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Agenda - {client_name}</title>
    <style>
      body {{
        font-family: "Inter", "Segoe UI", -apple-system, BlinkMacSystemFont, "Helvetica Neue", sans-serif;
        padding: 40px;
        max-width: 1200px;
        margin: 0 auto;
        color: #333;
        background-color: #f9f9f9;
      }}
      .agenda-header {{
        text-align: center;
        margin-bottom: 40px;
        padding-bottom: 20px;
        border-bottom: 1px solid #eaeaea;
      }}
      .agenda-header h1 {{
        color: {theme};
        font-size: 32px;
        margin-bottom: 8px;
        font-weight: 700;
      }}
      .agenda-header h2 {{
        font-size: 24px;
        margin: 0 0 10px;
        color: #333;
        font-weight: 600;
      }}
      .agenda-header p {{
        color: #666;
        margin-top: 0;
      }}
      .card-container {{
        display: grid;
        grid-template-columns: repeat(auto-fill, minmax(320px, 1fr));
        gap: 24px;
      }}
      .card {{
        border: 1px solid #e2e8f0;
        border-radius: 12px;
        padding: 24px;
        box-shadow: 0 4px 10px rgba(0, 0, 0, 0.05);
        background-color: white;
        break-inside: avoid;
        page-break-inside: avoid;
      }}
      .card-date {{
        background-color: {theme};
        color: white;
        display: inline-block;
        padding: 8px 16px;
        border-radius: 20px;
        font-weight: 700;
        margin-bottom: 16px;
        font-size: 14px;
      }}
      .card-title {{
        font-size: 20px;
        font-weight: 700;
        margin-bottom: 12px;
        color: #333;
      }}
      .card-type {{
        background-color: #f1f5f9;
        color: #64748b;
        padding: 6px 12px;
        border-radius: 12px;
        display: inline-block;
        font-size: 13px;
        margin-bottom: 14px;
        font-weight: 600;
      }}
      .card-text {{
        white-space: pre-line;
        color: #4b5563;
        line-height: 1.6;
        font-size: 15px;
      }}
      .social-icons {{
        display: flex;
        gap: 8px;
        margin-top: 16px;
      }}
      .social-icon {{
        background-color: #f1f5f9;
        color: #64748b;
        width: 28px;
        height: 28px;
        border-radius: 50%;
        display: flex;
        align-items: center;
        justify-content: center;
      }}
      .footer {{
        text-align: center;
        margin-top: 60px;
        padding-top: 20px;
        border-top: 1px solid #eaeaea;
        color: #666;
        font-size: 14px;
      }}
      @media print {{
        body {{
          padding: 0;
          background-color: white;
        }}
        .card-container {{
          gap: 16px;
        }}
        .card {{
          break-inside: avoid;
          page-break-inside: avoid;
          box-shadow: none;
          border: 1px solid #eaeaea;
        }}
      }}
    </style>
  </head>
  <body>
    <div class="agenda-header">
      <h1>Posting Schedule</h1>
      <h2>{client_name}</h2>
      <p>{today}</p>
    </div>
    <div class="card-container">
{cards}    </div>
    <div class="footer">
      <p>&copy; {year} {company}</p>
    </div>
    <script>
      window.addEventListener("load", function () {{
        setTimeout(function () {{ window.print(); }}, {delay_ms});
      }});
    </script>
  </body>
</html>
"#,
        client_name = client_name,
        theme = theme,
        today = input.date.format("%d/%m/%Y"),
        cards = cards,
        year = input.date.year(),
        company = html_escape(input.company_name),
        delay_ms = input.print_delay.as_millis(),
    )
}

fn render_card(out: &mut String, post: &ScheduledPost) {
    out.push_str("      <div class=\"card\">\n");
    out.push_str(&format!(
        "        <div class=\"card-date\">{}</div>\n",
        html_escape(&post.date_label())
    ));
    out.push_str(&format!(
        "        <div class=\"card-title\">{}</div>\n",
        html_escape(&post.title)
    ));
    out.push_str(&format!(
        "        <div class=\"card-type\">{}</div>\n",
        html_escape(&post.post_type)
    ));
    out.push_str(&format!(
        "        <div class=\"card-text\">{}</div>\n",
        html_escape(&post.text)
    ));
    if !post.social_networks.is_empty() {
        out.push_str("        <div class=\"social-icons\">\n");
        for network in &post.social_networks {
            out.push_str(&format!(
                "          <div class=\"social-icon\" title=\"{}\">{}</div>\n",
                html_escape(network),
                SOCIAL_ICON_SVG
            ));
        }
        out.push_str("        </div>\n");
    }
    out.push_str("      </div>\n");
}

/// Only well-formed hex colours reach the stylesheet.
fn css_color(value: &str) -> &str {
    let trimmed = value.trim();
    if parse_hex_color(trimmed).is_some() {
        trimmed
    } else {
        DEFAULT_THEME_COLOR
    }
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Persists `html` to a temporary `.html` file that outlives this process,
/// so a browser can load it after we return.
pub fn write_temp_document(html: &str) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("agenda_")
        .suffix(".html")
        .tempfile()
        .context("print: create temporary document")?;
    file.write_all(html.as_bytes())
        .context("print: write temporary document")?;
    let (_, path) = file.keep().context("print: keep temporary document")?;
    Ok(path)
}
