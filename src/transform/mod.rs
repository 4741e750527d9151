//! Source transforms applied while bundling
//!
//! - Placeholder substitution for versions and banner names
//! - Syntax lowering for the CommonJS and global formats (oxc transformer)
//! - Module syntax rewriting into the bundle's registry shape

mod modules;

use std::path::Path;

use anyhow::Result;
use once_cell::sync::Lazy;
use oxc::allocator::Allocator;
use oxc::ast::ast::Program;
use oxc::codegen::{Codegen, CodegenOptions, CodegenReturn};
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::SourceType;
use oxc::transformer::{ESTarget, TransformOptions, Transformer};
use regex::{NoExpand, Regex};

use crate::error::BuildError;

pub use modules::{analyze_module, rewrite_module, ModuleSyntax, RewrittenModule};

static VERSION_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<%=\s*(?:pkg\.)?version\s*%>").unwrap());

static NAME_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<%=\s*name\s*%>").unwrap());

/// Replace every version placeholder with `version`
pub fn substitute_version(text: &str, version: &str) -> String {
    VERSION_PLACEHOLDER
        .replace_all(text, NoExpand(version))
        .into_owned()
}

/// Fill the name and version placeholders of a banner template
pub fn render_banner(template: &str, name: &str, version: &str) -> String {
    let named = NAME_PLACEHOLDER.replace_all(template, NoExpand(name));
    substitute_version(&named, version)
}

/// Code printed from an AST, with the input line behind each output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Printed {
    pub code: String,
    /// 0-based input line of every output line, `None` where codegen
    /// produced a line with no mapped token
    pub lines: Vec<Option<u32>>,
}

impl Printed {
    /// Code whose lines are its input's lines
    pub fn identity(code: String) -> Self {
        let count = code.lines().count() as u32;
        Self {
            lines: (0..count).map(Some).collect(),
            code,
        }
    }

    /// Code with no line table
    pub fn unmapped(code: String) -> Self {
        Self {
            code,
            lines: Vec::new(),
        }
    }

    fn from_codegen(ret: CodegenReturn) -> Self {
        let mut lines = vec![None; ret.code.lines().count()];
        if let Some(map) = &ret.map {
            for token in map.get_tokens() {
                if let Some(slot) = lines.get_mut(token.get_dst_line() as usize) {
                    let src = token.get_src_line();
                    *slot = Some(slot.map_or(src, |line: u32| line.min(src)));
                }
            }
        }
        Self {
            code: ret.code,
            lines,
        }
    }

    /// Re-express the line table against the input of an earlier stage
    pub fn through(mut self, earlier: &[Option<u32>]) -> Self {
        for line in &mut self.lines {
            *line = line.and_then(|l| earlier.get(l as usize).copied().flatten());
        }
        self
    }
}

/// Parse `source`, failing on the first syntax error
pub(crate) fn parse<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    source_type: SourceType,
    path: &Path,
) -> Result<Program<'a>> {
    let ret = Parser::new(allocator, source, source_type).parse();
    if let Some(error) = ret.errors.first() {
        return Err(BuildError::Syntax {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
        .into());
    }
    Ok(ret.program)
}

/// Print `program` readably, tracking lines through a codegen source map
pub(crate) fn print(program: &Program<'_>, path: &Path) -> Printed {
    let ret = Codegen::new()
        .with_options(CodegenOptions {
            source_map_path: Some(path.to_path_buf()),
            ..CodegenOptions::default()
        })
        .build(program);
    Printed::from_codegen(ret)
}

/// Lower syntax newer than ES5 wherever the oxc transformer supports it.
///
/// Block scoping and classes are left as written; lowering them would need
/// renaming that the transformer does not do.
pub fn downlevel(source: &str, path: &Path) -> Result<Printed> {
    let allocator = Allocator::default();
    let mut program = parse(&allocator, source, SourceType::mjs(), path)?;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let options = TransformOptions::from(ESTarget::ES5);
    let ret =
        Transformer::new(&allocator, path, &options).build_with_scoping(scoping, &mut program);
    if let Some(error) = ret.errors.first() {
        return Err(BuildError::Syntax {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
        .into());
    }

    Ok(print(&program, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_version() {
        assert_eq!(
            substitute_version("v<%= version %> / <%=pkg.version%>", "1.2.0"),
            "v1.2.0 / 1.2.0"
        );
        assert_eq!(substitute_version("no placeholder", "1.2.0"), "no placeholder");
        // Replacement text is literal
        assert_eq!(substitute_version("<%= version %>", "$1"), "$1");
    }

    #[test]
    fn test_render_banner() {
        assert_eq!(
            render_banner("/*! <%= name %> v<%= version %> */", "TweenJS", "1.0.0"),
            "/*! TweenJS v1.0.0 */"
        );
    }

    #[test]
    fn test_downlevel_lowers_exponentiation() {
        let printed = downlevel("export var area = r ** 2;\n", Path::new("/src/Shape.js")).unwrap();
        assert!(printed.code.contains("Math.pow(r, 2)"));
        assert!(printed.code.contains("export var area"));
    }

    #[test]
    fn test_downlevel_keeps_block_scopes() {
        let source = "let x = 1;\nif (true) {\n  let x = 2;\n}\nexport var result = x;\n";
        let printed = downlevel(source, Path::new("/src/scope.js")).unwrap();

        // The inner binding must not leak into the outer `x`
        assert!(!printed.code.contains("var x = 2"));
        assert!(printed.code.contains("let x = 1;"));
        assert!(printed.code.contains("let x = 2;"));
        assert!(printed.code.contains("export var result = x;"));
    }

    #[test]
    fn test_downlevel_reports_syntax_errors() {
        let err = downlevel("let = ;", Path::new("/src/broken.js")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::Syntax { .. })
        ));
    }

    #[test]
    fn test_line_table_follows_statements() {
        let printed = downlevel("var a = 1;\n\n\nvar b = 2;\n", Path::new("/src/a.js")).unwrap();
        let b = printed
            .code
            .lines()
            .position(|line| line.contains("var b"))
            .unwrap();
        assert_eq!(printed.lines[0], Some(0));
        assert_eq!(printed.lines[b], Some(3));
    }

    #[test]
    fn test_line_table_composition() {
        let later = Printed {
            code: "a\nb\nc".to_string(),
            lines: vec![Some(1), None, Some(0)],
        };
        let composed = later.through(&[Some(4), Some(7)]);
        assert_eq!(composed.lines, vec![Some(7), None, Some(4)]);

        assert_eq!(Printed::identity("x\ny\n".to_string()).lines, vec![Some(0), Some(1)]);
    }
}
