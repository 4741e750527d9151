//! ES module syntax rewriting
//!
//! Every bundled module becomes a factory `function(module, exports, require)`
//! in the bundle registry. The module is parsed with oxc and its `import` and
//! `export` statements are replaced by text edits on their spans. Each
//! replacement keeps the number of lines it replaced so original line
//! numbers stay valid for source maps.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use oxc::allocator::Allocator;
use oxc::ast::ast::{
    Argument, CallExpression, Declaration, ExportAllDeclaration, ExportDefaultDeclaration,
    ExportDefaultDeclarationKind, ExportNamedDeclaration, Expression, ImportDeclaration,
    ImportDeclarationSpecifier, ImportExpression, Statement,
};
use oxc::ast_visit::{walk, Visit};
use oxc::span::{GetSpan, SourceType, Span};

use super::parse;

/// Import and export facts of one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSyntax {
    /// Every specifier the module loads, in source order, without repeats
    pub specifiers: Vec<String>,
    /// Names the module exports itself, `default` included
    pub exports: Vec<String>,
    /// Specifiers whose exports are forwarded with `export * from`
    pub star_exports: Vec<String>,
    /// Whether the module uses `import`/`export` syntax at all
    pub is_esm: bool,
}

/// A module after syntax rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenModule {
    pub code: String,
    pub syntax: ModuleSyntax,
}

/// Collect the import and export facts of `source`
pub fn analyze_module(source: &str, path: &Path) -> Result<ModuleSyntax> {
    Ok(rewrite_module(source, path, &HashMap::new())?.syntax)
}

/// Rewrite `source` for the registry. `keys` maps import specifiers to
/// registry keys; unmapped specifiers are kept verbatim.
pub fn rewrite_module(
    source: &str,
    path: &Path,
    keys: &HashMap<String, String>,
) -> Result<RewrittenModule> {
    let allocator = Allocator::default();
    let program = parse(&allocator, source, SourceType::mjs(), path)?;

    let mut rewriter = Rewriter {
        source,
        keys,
        edits: Vec::new(),
        trailer: Vec::new(),
        syntax: ModuleSyntax::default(),
        imports: 0,
        reexports: 0,
    };
    for statement in &program.body {
        rewriter.statement(statement);
    }
    rewriter.visit_program(&program);

    let Rewriter {
        edits,
        trailer,
        syntax,
        ..
    } = rewriter;

    let mut code = apply(source, edits);
    if !trailer.is_empty() {
        if !code.is_empty() && !code.ends_with('\n') {
            code.push('\n');
        }
        code.push_str(&trailer.join(" "));
        code.push('\n');
    }

    Ok(RewrittenModule { code, syntax })
}

/// Replace `span` of the source with `text`
struct Edit {
    span: Span,
    text: String,
}

struct Rewriter<'s> {
    source: &'s str,
    keys: &'s HashMap<String, String>,
    edits: Vec<Edit>,
    /// Export assignments that run after the module body
    trailer: Vec<String>,
    syntax: ModuleSyntax,
    imports: usize,
    reexports: usize,
}

impl Rewriter<'_> {
    /// Quoted registry key for `specifier`
    fn key(&mut self, specifier: &str) -> String {
        if !self.syntax.specifiers.iter().any(|s| s == specifier) {
            self.syntax.specifiers.push(specifier.to_string());
        }
        let key = self.keys.get(specifier).map_or(specifier, String::as_str);
        format!("{:?}", key)
    }

    fn export_name(&mut self, name: &str) {
        if !self.syntax.exports.iter().any(|n| n == name) {
            self.syntax.exports.push(name.to_string());
        }
    }

    /// Replace `span`, padding with newlines so the line count is unchanged
    fn replace(&mut self, span: Span, mut text: String) {
        let replaced = span.source_text(self.source).matches('\n').count();
        let written = text.matches('\n').count();
        text.extend(std::iter::repeat('\n').take(replaced.saturating_sub(written)));
        self.edits.push(Edit { span, text });
    }

    fn statement(&mut self, statement: &Statement<'_>) {
        match statement {
            Statement::ImportDeclaration(decl) => self.import(decl),
            Statement::ExportAllDeclaration(decl) => self.export_all(decl),
            Statement::ExportNamedDeclaration(decl) => self.export_named(decl),
            Statement::ExportDefaultDeclaration(decl) => self.export_default(decl),
            _ => return,
        }
        self.syntax.is_esm = true;
    }

    fn import(&mut self, decl: &ImportDeclaration<'_>) {
        let key = self.key(decl.source.value.as_str());
        let Some(specifiers) = decl.specifiers.as_ref().filter(|s| !s.is_empty()) else {
            self.replace(decl.span, format!("require({});", key));
            return;
        };

        let binding = format!("__import{}__", self.imports);
        self.imports += 1;

        let mut text = format!("var {} = require({});", binding, key);
        for specifier in specifiers {
            let line = match specifier {
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    format!(" var {} = __interopDefault__({});", s.local.name, binding)
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    format!(" var {} = {};", s.local.name, binding)
                }
                ImportDeclarationSpecifier::ImportSpecifier(s) => format!(
                    " var {} = {}[{:?}];",
                    s.local.name,
                    binding,
                    s.imported.name().as_str()
                ),
            };
            text.push_str(&line);
        }
        self.replace(decl.span, text);
    }

    fn export_all(&mut self, decl: &ExportAllDeclaration<'_>) {
        let specifier = decl.source.value.as_str();
        let key = self.key(specifier);
        match &decl.exported {
            Some(name) => {
                let name = name.name();
                self.export_name(name.as_str());
                self.replace(
                    decl.span,
                    format!("exports[{:?}] = require({});", name.as_str(), key),
                );
            }
            None => {
                self.syntax.star_exports.push(specifier.to_string());
                self.replace(decl.span, format!("__exportStar__(exports, require({}));", key));
            }
        }
    }

    fn export_named(&mut self, decl: &ExportNamedDeclaration<'_>) {
        if let Some(source) = &decl.source {
            let key = self.key(source.value.as_str());
            let binding = format!("__reexport{}__", self.reexports);
            self.reexports += 1;

            let mut text = format!("var {} = require({});", binding, key);
            for specifier in &decl.specifiers {
                let exported = specifier.exported.name();
                self.export_name(exported.as_str());
                text.push_str(&format!(
                    " exports[{:?}] = {}[{:?}];",
                    exported.as_str(),
                    binding,
                    specifier.local.name().as_str()
                ));
            }
            self.replace(decl.span, text);
        } else if let Some(declaration) = &decl.declaration {
            // Keep the declaration, drop the `export` keyword
            self.replace(Span::new(decl.span.start, declaration.span().start), String::new());
            for name in declared_names(declaration) {
                self.export_name(&name);
                self.trailer.push(format!("exports[{:?}] = {};", name, name));
            }
        } else {
            for specifier in &decl.specifiers {
                let exported = specifier.exported.name();
                self.export_name(exported.as_str());
                self.trailer.push(format!(
                    "exports[{:?}] = {};",
                    exported.as_str(),
                    specifier.local.name()
                ));
            }
            self.replace(decl.span, String::new());
        }
    }

    fn export_default(&mut self, decl: &ExportDefaultDeclaration<'_>) {
        self.export_name("default");
        let head = Span::new(decl.span.start, decl.declaration.span().start);

        let (name, anonymous_declaration) = match &decl.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                (func.id.as_ref().map(|id| id.name.to_string()), func.id.is_none())
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                (class.id.as_ref().map(|id| id.name.to_string()), class.id.is_none())
            }
            _ => (None, false),
        };

        match name {
            // A named declaration stays a declaration so its binding is visible
            Some(name) => {
                self.replace(head, String::new());
                self.trailer.push(format!("exports[\"default\"] = {};", name));
            }
            None => {
                self.replace(head, "exports[\"default\"] = ".to_string());
                if anonymous_declaration {
                    let end = decl.span.end;
                    self.edits.push(Edit {
                        span: Span::new(end, end),
                        text: ";".to_string(),
                    });
                }
            }
        }
    }
}

impl<'a> Visit<'a> for Rewriter<'_> {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let (Expression::Identifier(callee), [Argument::StringLiteral(literal)]) =
            (&call.callee, &call.arguments[..])
        {
            if callee.name.as_str() == "require" {
                let key = self.key(literal.value.as_str());
                self.edits.push(Edit {
                    span: literal.span,
                    text: key,
                });
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Expression::StringLiteral(literal) = &expr.source {
            let key = self.key(literal.value.as_str());
            self.replace(expr.span, format!("Promise.resolve(require({}))", key));
            return;
        }
        walk::walk_import_expression(self, expr);
    }
}

/// Names bound by an exported declaration
fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|d| d.id.get_binding_identifiers())
            .map(|id| id.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        _ => Vec::new(),
    }
}

/// Apply non-overlapping edits in source order
fn apply(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| edit.span.start);

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0usize;
    for edit in edits {
        let (start, end) = (edit.span.start as usize, edit.span.end as usize);
        if start < cursor {
            continue;
        }
        out.push_str(&source[cursor..start]);
        out.push_str(&edit.text);
        cursor = end;
    }
    out.push_str(&source[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::BuildError;

    fn keys(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn rewrite(source: &str, pairs: &[(&str, &str)]) -> RewrittenModule {
        rewrite_module(source, Path::new("/src/main.js"), &keys(pairs)).unwrap()
    }

    #[test]
    fn test_analyze_specifiers() {
        let source = r#"
            import Stage from './display/Stage';
            import { Ticker, Event as Evt } from "../events";
            import * as utils from './utils';
            import './polyfill';
            export { Tween } from './Tween';
            export * from './Ease';
            const x = require('./x');
            // import ignored from './commented';
            const later = import('./lazy');
            const again = require('./x');
        "#;

        let syntax = analyze_module(source, Path::new("/src/main.js")).unwrap();
        assert_eq!(
            syntax.specifiers,
            vec![
                "./display/Stage",
                "../events",
                "./utils",
                "./polyfill",
                "./Tween",
                "./Ease",
                "./x",
                "./lazy",
            ]
        );
        assert_eq!(syntax.star_exports, vec!["./Ease"]);
        assert_eq!(syntax.exports, vec!["Tween"]);
        assert!(syntax.is_esm);
    }

    #[test]
    fn test_rewrite_imports() {
        let source = "import Stage from './Stage';\n\
                      import { a, b as c } from './lib';\n\
                      import './side';\n";
        let rewritten = rewrite(source, &[("./Stage", "1"), ("./lib", "2"), ("./side", "3")]);

        assert_eq!(
            rewritten.code,
            "var __import0__ = require(\"1\"); var Stage = __interopDefault__(__import0__);\n\
             var __import1__ = require(\"2\"); \
             var a = __import1__[\"a\"]; var c = __import1__[\"b\"];\n\
             require(\"3\");\n"
        );
        assert!(rewritten.syntax.is_esm);
        assert!(rewritten.syntax.exports.is_empty());
    }

    #[test]
    fn test_rewrite_exports() {
        let source = "export class Stage {}\nexport function tick() {}\nconst x = 1;\n\
                      export { x as version };\nexport default Stage;";
        let rewritten = rewrite(source, &[]);

        assert_eq!(
            rewritten.code,
            "class Stage {}\nfunction tick() {}\nconst x = 1;\n\nexports[\"default\"] = Stage;\n\
             exports[\"Stage\"] = Stage; exports[\"tick\"] = tick; exports[\"version\"] = x;\n"
        );
        assert_eq!(rewritten.syntax.exports, vec!["Stage", "tick", "version", "default"]);
    }

    #[test]
    fn test_rewrite_default_declarations() {
        let named = rewrite("export default function Ticker() {}\nTicker.interval = 50;\n", &[]);
        assert_eq!(
            named.code,
            "function Ticker() {}\nTicker.interval = 50;\nexports[\"default\"] = Ticker;\n"
        );

        let anonymous = rewrite("export default class {}\n", &[]);
        assert_eq!(anonymous.code, "exports[\"default\"] = class {};\n");
    }

    #[test]
    fn test_rewrite_destructured_export() {
        let rewritten = rewrite("export const { width, height: h } = size;\n", &[]);
        assert_eq!(
            rewritten.code,
            "const { width, height: h } = size;\nexports[\"width\"] = width; exports[\"h\"] = h;\n"
        );
    }

    #[test]
    fn test_rewrite_reexports() {
        let source = "export { Tween, Ease as Easing } from './tween';\nexport * from './extras';\n\
                      export * as filters from './filters';\n";
        let rewritten = rewrite(source, &[("./tween", "4"), ("./extras", "5"), ("./filters", "6")]);

        assert_eq!(
            rewritten.code,
            "var __reexport0__ = require(\"4\"); exports[\"Tween\"] = __reexport0__[\"Tween\"]; \
             exports[\"Easing\"] = __reexport0__[\"Ease\"];\n\
             __exportStar__(exports, require(\"5\"));\n\
             exports[\"filters\"] = require(\"6\");\n"
        );
        assert_eq!(rewritten.syntax.exports, vec!["Tween", "Easing", "filters"]);
        assert_eq!(rewritten.syntax.star_exports, vec!["./extras"]);
    }

    #[test]
    fn test_multiline_import_keeps_line_count() {
        let source = "import {\n  a,\n  b\n} from './ab';\nuse(a, b);\n";
        let rewritten = rewrite(source, &[("./ab", "0")]);
        assert_eq!(rewritten.code.lines().count(), source.lines().count());
        assert!(rewritten.code.ends_with("\n\n\n\nuse(a, b);\n"));
    }

    #[test]
    fn test_commonjs_sources_untouched_except_require() {
        let source = "var dep = require('./dep');\nmodule.exports = dep;\n";
        let rewritten = rewrite(source, &[("./dep", "7")]);
        assert_eq!(rewritten.code, "var dep = require(\"7\");\nmodule.exports = dep;\n");
        assert!(!rewritten.syntax.is_esm);
    }

    #[test]
    fn test_strings_and_comments_are_not_imports() {
        let source = "var s = \"import x from './nope'\";\n/* require('./nope') */\n";
        let rewritten = rewrite(source, &[]);
        assert_eq!(rewritten.code, source);
        assert!(rewritten.syntax.specifiers.is_empty());
    }

    #[test]
    fn test_dynamic_import() {
        let rewritten = rewrite("var lazy = import('./lazy');\n", &[("./lazy", "3")]);
        assert_eq!(rewritten.code, "var lazy = Promise.resolve(require(\"3\"));\n");
    }

    #[test]
    fn test_syntax_error() {
        let err =
            rewrite_module("import {", Path::new("/src/bad.js"), &HashMap::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::Syntax { .. })
        ));
    }
}
