use std::fmt::Write as _;

use crate::graph::{DepGraph, Graph};

#[derive(Debug, Clone, Copy)]
#[allow(unused)]
pub enum DotColor {
    Red, Green, Blue, Grey, Black
}

impl DotColor {
    fn as_str(self) -> &'static str {
        match self {
            DotColor::Red => "red",
            DotColor::Green => "\"#98ea79\"",
            DotColor::Blue => "\"#84a7e8\"",
            DotColor::Grey => "\"#eeeeee\"",
            DotColor::Black => "black",
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl Graph {
    /// Render the dependency graph between live app-versions in Graphviz format. Defined
    /// app-versions are green, merged ones blue, and ones with no checksums left grey.
    pub fn to_dot_graph(&self) -> String {
        let deps = DepGraph::from_graph(self);

        let mut out = String::new();
        out.push_str("strict digraph {\n");
        out.push_str("\trankdir=\"BT\"\n");
        out.push_str("\tlabelloc=\"t\"\n");
        out.push_str("\tnode [shape=box style=filled]\n");
        out.push_str("\tedge [color=\"#333333\"]\n");

        for local in 0..deps.len() {
            let av = self.av(deps.node(local));
            let color = if !av.is_defined() {
                DotColor::Grey
            } else if av.key.is_merged() {
                DotColor::Blue
            } else {
                DotColor::Green
            };
            // Writing to a String can't fail.
            let _ = writeln!(&mut out, "\tn{} [fillcolor={} label=\"{} ({})\"]",
                local, color.as_str(), escape(&av.key.to_string()), av.checksums.len());
        }

        for local in 0..deps.len() {
            for to in deps.out(local).iter() {
                let _ = writeln!(&mut out, "\tn{} -> n{}", local, to);
            }
        }

        out.push_str("}\n");
        out
    }
}
