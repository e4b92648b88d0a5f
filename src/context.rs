//! Render ranked cases into the context block handed to generation

use std::fmt::Write;

use crate::retrieval::RankedCase;
use crate::similarity::format_percent;

/// First line of every context block
pub const CONTEXT_HEADER: &str = "历史相似案例：";

/// Paragraph emitted when no similar case was retrieved
pub const NO_SIMILAR_CASE: &str = "未找到相似案例，将基于缺陷描述直接进行分析。";

/// Render ranked cases as a context block
///
/// Cases are listed most similar first, each with its similarity, its
/// description and its non-empty metadata (never the provenance source).
/// An empty slice renders the [`NO_SIMILAR_CASE`] marker.
#[must_use]
pub fn assemble(cases: &[RankedCase]) -> String {
    let mut output = String::from(CONTEXT_HEADER);
    output.push('\n');

    if cases.is_empty() {
        output.push_str(NO_SIMILAR_CASE);
        output.push('\n');
        return output;
    }

    let mut ordered: Vec<&RankedCase> = cases.iter().collect();
    ordered.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    for (i, case) in ordered.iter().enumerate() {
        let _ = writeln!(
            output,
            "案例{}（相似度: {}）：",
            i + 1,
            format_percent(case.similarity)
        );
        let _ = writeln!(output, "{}", case.record.description);

        let fields: Vec<(&str, &str)> = case
            .record
            .metadata
            .display_fields()
            .into_iter()
            .filter(|(_, value)| is_displayable(value))
            .collect();

        if !fields.is_empty() {
            output.push_str("元数据信息:\n");
            for (name, value) in fields {
                let _ = writeln!(output, "{name}: {value}");
            }
        }
        output.push('\n');
    }

    output
}

/// Whether the block carries the no-match marker
#[must_use]
pub fn is_empty_context(context: &str) -> bool {
    context.contains(NO_SIMILAR_CASE)
}

/// Spreadsheet exports write missing cells as "nan"
fn is_displayable(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.eq_ignore_ascii_case("nan")
}
