//! Minimal writer for Mermaid flowchart text.

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum MermaidShape {
    Square,
    DoubleSquare,
    Circle,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum MermaidEdgeStyle {
    Solid,
    Dotted,
    Thick,
    Bidirectional,
    BidirectionalDotted,
}

pub(crate) struct MermaidBuilder {
    out: String,
    indent: usize,
}

impl MermaidBuilder {
    pub(crate) fn new() -> Self {
        let mut builder = Self {
            out: String::new(),
            indent: 0,
        };
        builder.line("flowchart TD");
        builder.indent += 1;
        builder
    }

    pub(crate) fn begin_subgraph(&mut self, label: &str) {
        self.line(&format!("subgraph \"{}\"", escape(label)));
        self.indent += 1;
    }

    pub(crate) fn end_subgraph(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("end");
    }

    pub(crate) fn node(&mut self, name: &str, label: &str, shape: MermaidShape) {
        let (open, close) = match shape {
            MermaidShape::Square => ("[", "]"),
            MermaidShape::DoubleSquare => ("[[", "]]"),
            MermaidShape::Circle => ("((", "))"),
        };
        self.line(&format!("{name}{open}\"{}\"{close}", escape(label)));
    }

    pub(crate) fn edge(&mut self, source: &str, target: &str, label: &str, style: MermaidEdgeStyle) {
        let (full, left, right) = match style {
            MermaidEdgeStyle::Solid => ("-->", "--", "-->"),
            MermaidEdgeStyle::Dotted => ("-.->", "-.", ".->"),
            MermaidEdgeStyle::Thick => ("==>", "==", "==>"),
            MermaidEdgeStyle::Bidirectional => ("<-->", "<--", "-->"),
            MermaidEdgeStyle::BidirectionalDotted => ("<-.->", "<-.", ".->"),
        };
        if label.is_empty() {
            self.line(&format!("{source} {full} {target}"));
        } else {
            self.line(&format!("{source} {left} \"{}\" {right} {target}", escape(label)));
        }
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }
}

fn escape(text: &str) -> String {
    text.replace('"', "#quot;")
}
