//! Source maps for non-minified outputs
//!
//! Mappings are per line. Each output line is traced back through the
//! pretty-printer's line table to a rendered line, and from there through
//! the module span to a line of the original source.

use std::path::Path;

use base64::Engine;
use oxc_sourcemap::SourceMapBuilder;

use crate::utils::relative_path;

use super::render::ModuleSpan;

/// Build the source map JSON for a bundle.
///
/// `body_lines` holds the rendered line behind each line of the written
/// body, and `line_offset` is the number of lines placed before the body
/// (the banner). Sources are recorded relative to `output_dir`.
pub fn generate(
    file_name: &str,
    output_dir: &Path,
    spans: &[ModuleSpan],
    body_lines: &[Option<u32>],
    line_offset: u32,
) -> String {
    let mut builder = SourceMapBuilder::default();
    builder.set_file(file_name);

    let source_ids: Vec<u32> = spans
        .iter()
        .map(|span| {
            let source = relative_path(output_dir, &span.path)
                .unwrap_or_else(|| span.path.display().to_string());
            builder.add_source_and_content(&source, &span.source)
        })
        .collect();

    for (output_line, rendered) in body_lines.iter().enumerate() {
        let Some(rendered) = *rendered else {
            continue;
        };
        let found = spans
            .iter()
            .zip(&source_ids)
            .find_map(|(span, &id)| span.source_line(rendered).map(|line| (id, line)));
        if let Some((source_id, source_line)) = found {
            builder.add_token(
                line_offset + output_line as u32,
                0,
                source_line,
                0,
                Some(source_id),
                None,
            );
        }
    }

    builder.into_sourcemap().to_json_string()
}

/// Trailer comment pointing at the map, or embedding it
pub fn reference_comment(json: &str, map_file_name: &str, inline: bool) -> String {
    if inline {
        let encoded = base64::engine::general_purpose::STANDARD.encode(json);
        format!("//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}", encoded)
    } else {
        format!("//# sourceMappingURL={}", map_file_name)
    }
}
