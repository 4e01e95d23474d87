//! A small SVG element tree. Panels and layers build nodes; the plot serialises them.

use std::fmt::{self, Write};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SvgNode {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<SvgNode>,
}

impl SvgNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn group(id: impl fmt::Display) -> Self {
        Self::new("g").attr("id", id)
    }

    pub fn attr(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn set_attr(&mut self, name: &str, value: impl fmt::Display) {
        let value = value.to_string();
        match self.attrs.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, node: SvgNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn push(&mut self, node: SvgNode) {
        self.children.push(node);
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.get_attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    /// Depth-first search by `id` attribute.
    pub fn find_by_id(&self, id: &str) -> Option<&SvgNode> {
        if self.get_attr("id") == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_id(id))
    }

    /// Every descendant (including self) carrying `class`.
    pub fn find_all_by_class<'a>(&'a self, class: &str) -> Vec<&'a SvgNode> {
        let mut found = Vec::new();
        self.collect_class(class, &mut found);
        found
    }

    fn collect_class<'a>(&'a self, class: &str, found: &mut Vec<&'a SvgNode>) {
        if self.has_class(class) {
            found.push(self);
        }
        for child in &self.children {
            child.collect_class(class, found);
        }
    }

    fn write_to(&self, out: &mut String, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(out, "{}<{}", indent, self.tag)?;
        for (name, value) in &self.attrs {
            write!(out, r#" {}="{}""#, name, escape_xml(value))?;
        }
        match (&self.text, self.children.is_empty()) {
            (None, true) => writeln!(out, "/>"),
            (Some(text), true) => writeln!(out, ">{}</{}>", escape_xml(text), self.tag),
            (text, false) => {
                writeln!(out, ">")?;
                if let Some(text) = text {
                    writeln!(out, "{}  {}", indent, escape_xml(text))?;
                }
                for child in &self.children {
                    child.write_to(out, depth + 1)?;
                }
                writeln!(out, "{}</{}>", indent, self.tag)
            }
        }
    }

    pub fn to_svg_string(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_to(&mut out, 0);
        out
    }
}

pub fn escape_xml(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn translate(x: f64, y: f64) -> String {
    format!("translate({}, {})", x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialises_nested_nodes() {
        let svg = SvgNode::group("p")
            .child(SvgNode::new("text").attr("class", "lz-title").with_text("a < b"))
            .to_svg_string();
        assert_eq!(
            svg,
            "<g id=\"p\">\n  <text class=\"lz-title\">a &lt; b</text>\n</g>\n"
        );
    }
}
