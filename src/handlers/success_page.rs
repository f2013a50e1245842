//! Builds the purchase confirmation document.
//!
//! The page is self-contained HTML: one block per entitlement (download
//! link, password and countdown for books; access confirmation for
//! system entitlements) plus a script that notifies any embedding parent
//! frame that the purchase succeeded.

use crate::services::fulfillment::{EntitlementKind, FulfillmentOutcome};

/// Seconds the download countdown shows before enabling the link; the
/// generation worker normally finishes well within this.
const DOWNLOAD_COUNTDOWN_SECS: u32 = 30;

pub fn render_success_page(outcome: &FulfillmentOutcome) -> String {
    let mut blocks = String::new();

    for grant in &outcome.grants {
        match (grant.kind, &grant.book) {
            (EntitlementKind::Book, Some(book)) => {
                blocks.push_str(&format!(
                    r#"      <section class="entitlement entitlement-book" data-product-id="{product_id}">
        <h2>{name}</h2>
        <p>Your file is being prepared and will be ready shortly.</p>
        <p class="countdown" data-seconds="{countdown}">Preparing your download&hellip;</p>
        <p><a class="download-link" href="{link}" download>{filename}</a></p>
        <p>Password: <code>{password}</code></p>
        <p class="expiry">Available until {expiry}.</p>
      </section>
"#,
                    product_id = grant.product_id,
                    name = escape_html(&grant.product_name),
                    countdown = DOWNLOAD_COUNTDOWN_SECS,
                    link = book.download_link,
                    filename = escape_html(&book.filename),
                    password = escape_html(&book.password),
                    expiry = book.valid_until.format("%Y-%m-%d"),
                ));
            }
            _ => {
                blocks.push_str(&format!(
                    r#"      <section class="entitlement entitlement-system" data-product-id="{product_id}">
        <h2>{name}</h2>
        <p>Your access is active.</p>
        <p class="expiry">Valid until {expiry}.</p>
      </section>
"#,
                    product_id = grant.product_id,
                    name = escape_html(&grant.product_name),
                    expiry = grant.valid_until.format("%Y-%m-%d"),
                ));
            }
        }
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>Purchase confirmed</title>
  </head>
  <body data-transaction-id="{transaction_id}">
    <main>
      <h1>Thank you for your purchase!</h1>
{blocks}    </main>
    <script>
      if (window.parent !== window) {{
        window.parent.postMessage({{"status": "success"}}, "*");
      }}
      document.querySelectorAll(".countdown").forEach(function (el) {{
        var remaining = parseInt(el.dataset.seconds, 10);
        var timer = setInterval(function () {{
          remaining -= 1;
          if (remaining <= 0) {{
            clearInterval(timer);
            el.textContent = "Your download is ready.";
          }} else {{
            el.textContent = "Ready in " + remaining + "s";
          }}
        }}, 1000);
      }});
    </script>
  </body>
</html>
"#,
        transaction_id = outcome.transaction.id,
        blocks = blocks,
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
