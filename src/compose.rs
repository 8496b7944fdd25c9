//! Hindi message bodies for each delivery channel.
//!
//! Everything here is pure formatting: no I/O and no failure modes.

use crate::providers::Reading;

const ADVISORIES: [&str; 3] = [
    "सिंचाई और छिड़काव की योजना आज के मौसम को देखकर बनाएं।",
    "फसल बेचने से पहले नज़दीकी मंडी का ताज़ा भाव ज़रूर जांचें।",
    "बारिश की संभावना हो तो कटी हुई फसल को ढककर रखें।",
];

pub fn sms_body(name: &str, commodity: &str, reading: &Reading) -> String {
    format!(
        "नमस्ते {name}! आज मौसम: {}°C, बारिश: {}mm.\n\
         {commodity} भाव: ₹{}/qtl (विश्वास: {}).",
        reading.temperature, reading.rainfall, reading.price, reading.price_confidence,
    )
}

/// TwiML instructions; the provider speaks the `<Say>` block in Hindi.
pub fn voice_script(name: &str, commodity: &str, reading: &Reading) -> String {
    let name = escape(name);
    let commodity = escape(commodity);
    format!(
        r#"<Response>
    <Say voice="alice" language="hi-IN">
        नमस्ते {name}! आप कैसे हैं? आपने खाना खाया?
        आज {commodity} का भाव ₹{}/क्विंटल है।
        मौसम: {} डिग्री सेल्सियस, बारिश {} मिलीमीटर।
        और कोई मदद चाहिए?
    </Say>
</Response>"#,
        reading.price, reading.temperature, reading.rainfall,
    )
}

pub fn email_subject(commodity: &str) -> String {
    format!("आज का मौसम और {commodity} मंडी भाव")
}

pub fn email_html(name: &str, commodity: &str, reading: &Reading) -> String {
    let name = escape(name);
    let commodity = escape(commodity);
    let advisories: String = ADVISORIES
        .iter()
        .map(|line| format!("        <li>{line}</li>\n"))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="hi">
<head>
<meta charset="utf-8">
<style>
  body {{ font-family: sans-serif; background: #f4f7f2; color: #1f2d1a; }}
  .card {{ max-width: 520px; margin: 24px auto; background: #fff; border-radius: 8px; padding: 24px; }}
  h2 {{ color: #2e7d32; margin-top: 0; }}
  table {{ width: 100%; border-collapse: collapse; }}
  td {{ padding: 6px 0; border-bottom: 1px solid #e0e0e0; }}
  .muted {{ color: #6b7b66; font-size: 12px; }}
</style>
</head>
<body>
  <div class="card">
    <h2>नमस्ते {name}!</h2>
    <p>आज के लिए आपकी मौसम और मंडी जानकारी:</p>
    <table>
      <tr><td>तापमान</td><td>{}°C</td></tr>
      <tr><td>बारिश</td><td>{} mm</td></tr>
      <tr><td>{commodity} भाव</td><td>₹{}/क्विंटल</td></tr>
      <tr><td>विश्वास</td><td>{}</td></tr>
    </table>
    <h3>सलाह</h3>
    <ul>
{advisories}    </ul>
    <p class="muted">AgriBuddy द्वारा भेजा गया</p>
  </div>
</body>
</html>
"#,
        reading.temperature, reading.rainfall, reading.price, reading.price_confidence,
    )
}

/// Escape text for embedding in HTML or TwiML.
fn escape(text: &str) -> String {
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
