//! Printers: plain text with colored namespace prompt, or JSON.

use owo_colors::OwoColorize;

use crate::session::EvalResult;

pub struct ResultPrinter {
    pub json: bool,
    pub color: bool,
}

impl ResultPrinter {
    pub fn print(&self, result: &EvalResult) {
        println!("{}", self.render(result));
    }

    pub fn render(&self, result: &EvalResult) -> String {
        if self.json {
            return serde_json::to_string(result).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e));
        }
        let mut out = String::new();
        if let Some(text) = result.get("out").and_then(|v| v.as_str()) {
            out.push_str(text);
        }
        if let Some(text) = result.get("err").and_then(|v| v.as_str()) {
            if self.color {
                out.push_str(&format!("{}", text.red()));
            } else {
                out.push_str(text);
            }
        }
        if let Some(value) = &result.value {
            out.push_str(value);
        }
        out
    }

    pub fn prompt(&self, ns: &str) -> String {
        if self.color {
            format!("{}=> ", ns.cyan())
        } else {
            format!("{}=> ", ns)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nrepl::Value;

    fn result(value: &str) -> EvalResult {
        EvalResult {
            session: Some("abc".into()),
            ns: Some("user".into()),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_plain() {
        let p = ResultPrinter { json: false, color: false };
        let mut r = result("nil");
        r.extra.insert("out".into(), Value::string("hi\n"));
        assert_eq!(p.render(&r), "hi\nnil");
        assert_eq!(p.prompt("user"), "user=> ");
    }

    #[test]
    fn test_render_json() {
        let p = ResultPrinter { json: true, color: false };
        let json: serde_json::Value = serde_json::from_str(&p.render(&result("3"))).unwrap();
        assert_eq!(json["value"], "3");
        assert_eq!(json["session"], "abc");
    }
}
