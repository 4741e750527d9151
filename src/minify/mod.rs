//! Comment filtering, minification and pretty-printing of bundle bodies
//!
//! Both passes parse the rendered body with oxc, drop the comments the
//! matching predicate rejects from `program.comments`, and print what is
//! left: through the oxc minifier for minified outputs, through plain
//! codegen for readable ones.

use std::path::Path;

use anyhow::Result;
use oxc::allocator::Allocator;
use oxc::ast::ast::Program;
use oxc::codegen::{Codegen, CodegenOptions};
use oxc::minifier::{
    CompressOptions, CompressOptionsKeepNames, MangleOptions, Minifier, MinifierOptions,
};
use oxc::span::SourceType;
use oxc::transformer::ESTarget;

use crate::transform::{parse, print, Printed};

/// What the preservation predicates know about a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentInfo<'a> {
    /// 1-based line the comment starts on
    pub line: u32,
    /// Full comment text including delimiters
    pub text: &'a str,
    /// Mentions a license or copyright, case-insensitively
    pub has_license_marker: bool,
}

impl<'a> CommentInfo<'a> {
    pub fn new(line: u32, text: &'a str) -> Self {
        let lower = text.to_lowercase();
        Self {
            line,
            text,
            has_license_marker: lower.contains("license") || lower.contains("copyright"),
        }
    }

    /// `/*! ... */` or an explicit `@preserve` tag
    pub fn has_preserve_marker(&self) -> bool {
        self.text.starts_with("/*!") || self.text.contains("@preserve")
    }
}

/// Minified outputs keep the first-line banner and nothing else
pub fn keep_minified_comment(comment: &CommentInfo<'_>) -> bool {
    comment.line == 1
}

/// Non-minified outputs keep the banner plus license and preserved comments
pub fn keep_non_minified_comment(comment: &CommentInfo<'_>) -> bool {
    comment.line == 1 || comment.has_license_marker || comment.has_preserve_marker()
}

/// Drop the comments `keep` rejects. `first_line` is the 1-based line of
/// the final output that `source` starts on.
fn filter_comments(
    program: &mut Program<'_>,
    source: &str,
    first_line: u32,
    mut keep: impl FnMut(&CommentInfo<'_>) -> bool,
) {
    let line_starts: Vec<u32> = std::iter::once(0)
        .chain(source.match_indices('\n').map(|(i, _)| i as u32 + 1))
        .collect();

    program.comments.retain(|comment| {
        let line = line_starts.partition_point(|&start| start <= comment.span.start) as u32 - 1;
        keep(&CommentInfo::new(
            first_line + line,
            comment.span.source_text(source),
        ))
    });
}

/// Minify a bundle body. `path` names the artifact in syntax errors.
pub fn minify(source: &str, first_line: u32, path: &Path) -> Result<String> {
    let allocator = Allocator::default();
    let mut program = parse(&allocator, source, SourceType::cjs(), path)?;
    filter_comments(&mut program, source, first_line, keep_minified_comment);

    let ret = Minifier::new(MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions {
            target: ESTarget::ES5,
            drop_debugger: false,
            drop_console: false,
            keep_names: CompressOptionsKeepNames {
                function: true,
                class: true,
            },
            ..CompressOptions::default()
        }),
    })
    .build(&allocator, &mut program);

    Ok(Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code)
}

/// Pretty-print a bundle body with `indent` per nesting level
pub fn beautify(source: &str, first_line: u32, indent: &str, path: &Path) -> Result<Printed> {
    let allocator = Allocator::default();
    let mut program = parse(&allocator, source, SourceType::cjs(), path)?;
    filter_comments(&mut program, source, first_line, keep_non_minified_comment);

    let mut printed = print(&program, path);
    if indent != "\t" {
        printed.code = reindent(&printed.code, indent);
    }
    Ok(printed)
}

/// Codegen indents with tabs; swap each leading tab for `indent`
fn reindent(code: &str, indent: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for line in code.split_inclusive('\n') {
        let body = line.trim_start_matches('\t');
        for _ in 0..(line.len() - body.len()) {
            out.push_str(indent);
        }
        out.push_str(body);
    }
    out
}
