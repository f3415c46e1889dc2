//! Page-side JavaScript evaluated through CDP.
//!
//! Selectors are embedded as JSON string literals so quoting in attribute
//! selectors survives.

fn literal(selector: &str) -> String {
    serde_json::Value::String(selector.to_string()).to_string()
}

pub fn query_rects(selector: &str) -> String {
    format!(
        r#"(() => {{
  const sx = window.scrollX, sy = window.scrollY;
  return Array.from(document.querySelectorAll({sel})).map((el) => {{
    const r = el.getBoundingClientRect();
    return {{ top: r.top + sy, left: r.left + sx, width: r.width, height: r.height }};
  }});
}})()"#,
        sel = literal(selector)
    )
}

pub fn image_states(selector: &str) -> String {
    format!(
        r#"(() => {{
  const sx = window.scrollX, sy = window.scrollY;
  return Array.from(document.querySelectorAll({sel})).map((img) => {{
    const r = img.getBoundingClientRect();
    return {{
      complete: !!img.complete,
      naturalWidth: img.naturalWidth || 0,
      rect: {{ top: r.top + sy, left: r.left + sx, width: r.width, height: r.height }}
    }};
  }});
}})()"#,
        sel = literal(selector)
    )
}

pub fn click(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.click();
  return true;
}})()"#,
        sel = literal(selector)
    )
}

/// Called with `this` bound to an `<iframe>` element.
pub const OWNER_RECT_FN: &str = r#"function () {
  const r = this.getBoundingClientRect();
  const w = this.ownerDocument.defaultView;
  const sx = w ? w.scrollX : 0, sy = w ? w.scrollY : 0;
  return { top: r.top + sy, left: r.left + sx, width: r.width, height: r.height };
}"#;
