//! Bundle rendering
//!
//! Every module becomes a factory in a small registry runtime. The runtime
//! and the way entry exports leave the bundle depend on the output format.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::Result;

use crate::naming::Format;
use crate::transform::rewrite_module;

use super::graph::{Link, ModuleGraph, ModuleId};

const RUNTIME: &str = r#"var __modules__ = {};
var __cache__ = {};
function __require__(id) {
	if (__cache__[id]) {
		return __cache__[id].exports;
	}
	if (!__modules__[id]) {
		return __external__(id);
	}
	var module = { exports: {} };
	__cache__[id] = module;
	__modules__[id](module, module.exports, __require__);
	return module.exports;
}
function __interopDefault__(m) {
	return m && m.__esModule ? m["default"] : m;
}
function __exportStar__(target, source) {
	for (var key in source) {
		if (key !== "default" && key !== "__esModule" && !(key in target)) {
			target[key] = source[key];
		}
	}
}
"#;

/// Where a module's code landed in the rendered bundle
#[derive(Debug, Clone)]
pub struct ModuleSpan {
    pub path: PathBuf,
    pub source: String,
    /// 0-based line of the module's first line in the rendered text
    pub first_line: u32,
    /// Source line behind each rendered line from `first_line` on
    pub lines: Vec<Option<u32>>,
}

impl ModuleSpan {
    /// Source line behind rendered line `line`, if it belongs to this module
    pub fn source_line(&self, line: u32) -> Option<u32> {
        let offset = line.checked_sub(self.first_line)?;
        self.lines.get(offset as usize).copied().flatten()
    }
}

/// What a module exports, as far as the ES module output needs to know
#[derive(Default)]
struct ExportFacts {
    names: Vec<String>,
    /// Modules whose exports are forwarded with `export *`
    stars: Vec<ModuleId>,
}

/// Rendered bundle text, before banner and post-processing
#[derive(Debug, Clone)]
pub struct Rendered {
    pub code: String,
    pub spans: Vec<ModuleSpan>,
}

/// Append-only text buffer that knows its line count
struct Writer {
    out: String,
    lines: u32,
}

impl Writer {
    fn new() -> Self {
        Self {
            out: String::new(),
            lines: 0,
        }
    }

    fn push(&mut self, text: &str) {
        self.lines += text.matches('\n').count() as u32;
        self.out.push_str(text);
    }

    fn line(&mut self, text: &str) {
        self.push(text);
        self.push("\n");
    }
}

/// Render `graph` in the given format. `global_name` is the namespace object
/// the global format assigns into.
pub fn render(graph: &ModuleGraph, format: Format, global_name: &str) -> Result<Rendered> {
    let mut writer = Writer::new();
    let mut spans = Vec::with_capacity(graph.len());
    let mut facts: Vec<ExportFacts> = Vec::with_capacity(graph.len());

    match format {
        Format::Esm => {
            let externals = graph.externals();
            for (i, specifier) in externals.iter().enumerate() {
                writer.line(&format!("import * as __external{}__ from {:?};", i, specifier));
            }
            let table = externals
                .iter()
                .enumerate()
                .map(|(i, specifier)| format!("{:?}: __external{}__", specifier, i))
                .collect::<Vec<_>>()
                .join(", ");
            writer.line(&format!("var __externals__ = {{ {} }};", table));
            writer.line("function __external__(id) {\n\treturn __externals__[id];\n}");
        }
        Format::CommonJs => {
            writer.line("function __external__(id) {\n\treturn require(id);\n}");
        }
        Format::Global => {
            writer.line("(function(root) {");
            writer.line("function __external__(id) {\n\treturn root[id];\n}");
        }
    }

    writer.push(RUNTIME);

    for (id, module) in graph.modules() {
        let keys: HashMap<String, String> = module
            .links
            .iter()
            .filter_map(|(specifier, link)| match link {
                Link::Module(target) => Some((specifier.clone(), target.to_string())),
                Link::External => None,
            })
            .collect();

        let rewritten = rewrite_module(&module.code, &module.path, &keys)?;

        let mut header = format!("__modules__[\"{}\"] = function(module, exports, require) {{", id);
        if rewritten.syntax.is_esm {
            header.push_str(" exports.__esModule = true;");
        }
        writer.line(&header);

        let first_line = writer.lines;
        writer.push(&rewritten.code);
        if !rewritten.code.ends_with('\n') {
            writer.push("\n");
        }
        let emitted = writer.lines - first_line;
        writer.line("};");

        spans.push(ModuleSpan {
            path: module.path.clone(),
            source: module.source.clone(),
            first_line,
            lines: module.lines.iter().take(emitted as usize).copied().collect(),
        });

        let stars = rewritten
            .syntax
            .star_exports
            .iter()
            .filter_map(|specifier| match module.links.iter().find(|(s, _)| s == specifier) {
                Some((_, Link::Module(target))) => Some(*target),
                _ => None,
            })
            .collect();
        facts.push(ExportFacts {
            names: rewritten.syntax.exports,
            stars,
        });
    }

    match graph.entries() {
        [single] => writer.line(&format!("var __exports__ = __require__(\"{}\");", single)),
        entries => {
            writer.line("var __exports__ = {};");
            for entry in entries {
                writer.line(&format!("__exportStar__(__exports__, __require__(\"{}\"));", entry));
            }
        }
    }

    match format {
        Format::Esm => {
            writer.line("export default __exports__;");
            let mut seen = HashSet::new();
            let mut names = Vec::new();
            for &entry in graph.entries() {
                collect_exports(entry, &facts, &mut seen, &mut names);
            }
            for name in names.iter().filter(|n| is_identifier(n) && *n != "default") {
                writer.line(&format!("export var {} = __exports__[\"{}\"];", name, name));
            }
        }
        Format::CommonJs => writer.line("module.exports = __exports__;"),
        Format::Global => {
            writer.line(&format!(
                "var __namespace__ = root[{:?}] = root[{:?}] || {{}};",
                global_name, global_name
            ));
            writer.line("for (var __key__ in __exports__) {");
            writer.line("\tif (__key__ !== \"default\" && __key__ !== \"__esModule\") {");
            writer.line("\t\t__namespace__[__key__] = __exports__[__key__];");
            writer.line("\t}");
            writer.line("}");
            writer.line("})(typeof self !== \"undefined\" ? self : this);");
        }
    }

    Ok(Rendered {
        code: writer.out,
        spans,
    })
}

/// Export names of `id`, following `export *` through the bundle
fn collect_exports(
    id: ModuleId,
    facts: &[ExportFacts],
    seen: &mut HashSet<ModuleId>,
    names: &mut Vec<String>,
) {
    if !seen.insert(id) {
        return;
    }
    let Some(module) = facts.get(id) else {
        return;
    };
    for name in &module.names {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    for &target in &module.stars {
        collect_exports(target, facts, seen, names);
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::bundler::graph::{Module, ModuleType};

    fn module(path: &str, code: &str, is_entry: bool, links: Vec<(String, Link)>) -> Module {
        Module {
            path: PathBuf::from(path),
            source: code.to_string(),
            hash: String::new(),
            module_type: ModuleType::JavaScript,
            is_entry,
            dependencies: links.iter().map(|(s, _)| s.clone()).collect(),
            code: code.to_string(),
            lines: (0..code.lines().count() as u32).map(Some).collect(),
            links,
        }
    }

    fn sample_graph() -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        graph.add_module(module(
            "/src/main.js",
            "import Ticker from './Ticker';\nimport _ from 'lodash';\nexport class Stage {}\n",
            true,
            vec![
                ("./Ticker".into(), Link::Module(1)),
                ("lodash".into(), Link::External),
            ],
        ));
        graph.add_module(module(
            "/src/Ticker.js",
            "export default function Ticker() {}\n",
            false,
            vec![],
        ));
        graph
    }

    #[test]
    fn test_global_format() {
        let rendered = render(&sample_graph(), Format::Global, "createjs").unwrap();

        assert!(rendered.code.starts_with("(function(root) {\n"));
        assert!(rendered.code.contains(
            "__modules__[\"0\"] = function(module, exports, require) { exports.__esModule = true;\n"
        ));
        assert!(rendered.code.contains("var __import0__ = require(\"1\");"));
        assert!(rendered.code.contains("var __import1__ = require(\"lodash\");"));
        assert!(rendered
            .code
            .contains("var __namespace__ = root[\"createjs\"] = root[\"createjs\"] || {};"));
        assert!(rendered.code.ends_with("})(typeof self !== \"undefined\" ? self : this);\n"));
    }

    #[test]
    fn test_commonjs_format() {
        let rendered = render(&sample_graph(), Format::CommonJs, "createjs").unwrap();
        assert!(rendered.code.contains("return require(id);"));
        assert!(rendered
            .code
            .contains("var __exports__ = __require__(\"0\");\nmodule.exports = __exports__;\n"));
    }

    #[test]
    fn test_esm_format() {
        let rendered = render(&sample_graph(), Format::Esm, "createjs").unwrap();
        assert!(rendered.code.starts_with("import * as __external0__ from \"lodash\";\n"));
        assert!(rendered.code.contains("var __externals__ = { \"lodash\": __external0__ };"));
        assert!(rendered
            .code
            .contains("export default __exports__;\nexport var Stage = __exports__[\"Stage\"];\n"));
    }

    #[test]
    fn test_combined_entries_are_merged() {
        let mut graph = ModuleGraph::new();
        graph.add_module(module("/easel/main.js", "export var Stage = 1;\n", true, vec![]));
        graph.add_module(module("/tween/main.js", "export var Tween = 2;\n", true, vec![]));

        let rendered = render(&graph, Format::Esm, "createjs").unwrap();
        assert!(rendered.code.contains(
            "var __exports__ = {};\n\
             __exportStar__(__exports__, __require__(\"0\"));\n\
             __exportStar__(__exports__, __require__(\"1\"));\n"
        ));
        assert!(rendered.code.contains("export var Stage = __exports__[\"Stage\"];"));
        assert!(rendered.code.contains("export var Tween = __exports__[\"Tween\"];"));
    }

    #[test]
    fn test_star_exports_reach_the_module_output() {
        let mut graph = ModuleGraph::new();
        graph.add_module(module(
            "/src/main.js",
            "export * from './display';\nexport var VERSION = '1';\n",
            true,
            vec![("./display".into(), Link::Module(1))],
        ));
        graph.add_module(module(
            "/src/display.js",
            "export * from './Stage';\nexport default 1;\n",
            false,
            vec![("./Stage".into(), Link::Module(2))],
        ));
        graph.add_module(module(
            "/src/Stage.js",
            "export * from './display';\nexport class Stage {}\n",
            false,
            vec![("./display".into(), Link::Module(1))],
        ));

        let rendered = render(&graph, Format::Esm, "createjs").unwrap();
        assert!(rendered.code.ends_with(
            "export default __exports__;\n\
             export var VERSION = __exports__[\"VERSION\"];\n\
             export var Stage = __exports__[\"Stage\"];\n"
        ));
    }

    #[test]
    fn test_spans_point_at_module_lines() {
        let rendered = render(&sample_graph(), Format::CommonJs, "createjs").unwrap();
        let lines: Vec<&str> = rendered.code.lines().collect();

        let ticker = &rendered.spans[1];
        assert_eq!(ticker.path, PathBuf::from("/src/Ticker.js"));
        assert_eq!(lines[ticker.first_line as usize], "function Ticker() {}");
        assert_eq!(ticker.source_line(ticker.first_line), Some(0));
        // The export trailer has no source line
        assert_eq!(ticker.source_line(ticker.first_line + 1), None);

        let main = &rendered.spans[0];
        assert_eq!(main.lines.len(), 3);
        assert_eq!(lines[main.first_line as usize + 2], "class Stage {}");
        assert_eq!(main.source_line(main.first_line + 2), Some(2));
        assert_eq!(main.source_line(main.first_line - 1), None);
    }

    #[test]
    fn test_identifier_check() {
        assert!(is_identifier("Stage"));
        assert!(is_identifier("$el"));
        assert!(!is_identifier("default-export"));
        assert!(!is_identifier("1st"));
    }
}
