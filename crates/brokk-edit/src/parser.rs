//! Edit-Block Parser — turns one LLM response string into
//! [`ParseOutcome`], a list of [`EditBlock`]s plus an optional non-fatal
//! parse error describing the last block that couldn't be understood.
//!
//! Line-oriented, forgiving of fence/filename placement the way a
//! hand-written recursive-descent reader tolerates whitespace: state
//! advances through a small set of markers rather than building a
//! regex grammar, matching the teacher's `parse_porcelain_status`
//! line-scanning style.

use brokk_core::edit_op::EditOperation;

const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
const DIVIDER_MARKER: &str = "=======";
const REPLACE_MARKER: &str = ">>>>>>> REPLACE";
const FENCE_MARKER: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBlock {
    pub raw_filename: Option<String>,
    pub operation: EditOperation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub blocks: Vec<EditBlock>,
    pub parse_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    InSearch,
    InReplace,
}

struct PendingBlock {
    filename: Option<String>,
    before_lines: Vec<String>,
    after_lines: Vec<String>,
}

/// Parses every SEARCH/REPLACE block out of `response`. Malformed
/// blocks are skipped with the most recent failure recorded in
/// `parse_error`; well-formed blocks before and after a bad one are
/// still returned.
pub fn parse(response: &str) -> ParseOutcome {
    let lines: Vec<&str> = response.lines().collect();
    let mut blocks = Vec::new();
    let mut parse_error = None;

    let mut state = ScanState::Outside;
    let mut pending: Option<PendingBlock> = None;
    let mut last_non_blank_outside: Option<&str> = None;
    let mut fence_filename: Option<String> = None;

    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];
        match state {
            ScanState::Outside => {
                if line.trim() == SEARCH_MARKER {
                    let filename = fence_filename
                        .take()
                        .or_else(|| last_non_blank_outside.map(|s| s.trim().to_string()))
                        .filter(|s| !s.is_empty() && !s.starts_with(FENCE_MARKER));
                    pending = Some(PendingBlock {
                        filename,
                        before_lines: Vec::new(),
                        after_lines: Vec::new(),
                    });
                    state = ScanState::InSearch;
                } else if line.starts_with(FENCE_MARKER) {
                    // Filename given on the fence line itself, e.g. ```path/to/file.rs
                    let rest = line.trim_start_matches('`').trim();
                    fence_filename = if rest.is_empty() {
                        None
                    } else {
                        Some(rest.to_string())
                    };
                } else if !line.trim().is_empty() {
                    last_non_blank_outside = Some(line);
                }
            }
            ScanState::InSearch => {
                if line.trim() == DIVIDER_MARKER {
                    state = ScanState::InReplace;
                } else {
                    pending.as_mut().unwrap().before_lines.push(line.to_string());
                }
            }
            ScanState::InReplace => {
                if line.trim() == REPLACE_MARKER {
                    let block = pending.take().unwrap();
                    let before_text = block.before_lines.join("\n");
                    let after_text = block.after_lines.join("\n");
                    blocks.push(EditBlock {
                        raw_filename: block.filename.clone(),
                        operation: EditOperation::new(block.filename, before_text, after_text),
                    });
                    state = ScanState::Outside;
                    last_non_blank_outside = None;
                    fence_filename = None;
                } else {
                    pending.as_mut().unwrap().after_lines.push(line.to_string());
                }
            }
        }
        index += 1;
    }

    // Unclosed block: forgiving-divider recovery, else a parse error.
    if let Some(block) = pending.take() {
        match state {
            ScanState::InSearch => {
                // A SEARCH section with no divider at all and no
                // REPLACE: try the forgiving-divider scan over the
                // whole collected text in case the exact marker text
                // was mangled but a lone `=======` line is present.
                match recover_forgiving_divider(&block.before_lines) {
                    Some((before, after)) => blocks.push(EditBlock {
                        raw_filename: block.filename.clone(),
                        operation: EditOperation::new(block.filename, before, after),
                    }),
                    None => {
                        parse_error = Some("unclosed SEARCH/REPLACE block: missing divider".to_string());
                    }
                }
            }
            ScanState::InReplace => {
                parse_error = Some(
                    "unclosed SEARCH/REPLACE block: missing '>>>>>>> REPLACE' terminator".to_string(),
                );
            }
            ScanState::Outside => unreachable!("pending block only set while scanning"),
        }
    }

    if blocks.is_empty() && parse_error.is_none() {
        parse_error = Some("no SEARCH/REPLACE block found".to_string());
    }

    ParseOutcome { blocks, parse_error }
}

/// Forgiving-divider recovery: if the block has no exact divider line
/// but exactly one standalone `=======` appears among its lines, treat
/// that as the split point.
fn recover_forgiving_divider(lines: &[String]) -> Option<(String, String)> {
    let divider_positions: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim() == DIVIDER_MARKER)
        .map(|(i, _)| i)
        .collect();

    if divider_positions.len() != 1 {
        return None;
    }

    let split = divider_positions[0];
    let before = lines[..split].join("\n");
    let after = lines[split + 1..].join("\n");
    Some((before, after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokk_core::edit_op::OperationKind;

    #[test]
    fn parses_single_fenced_block_with_filename_above_fence() {
        let response = "src/main.rs\n```\n<<<<<<< SEARCH\nold line\n=======\nnew line\n>>>>>>> REPLACE\n```\n";
        let outcome = parse(response);
        assert_eq!(outcome.blocks.len(), 1);
        assert!(outcome.parse_error.is_none());
        let block = &outcome.blocks[0];
        assert_eq!(block.raw_filename.as_deref(), Some("src/main.rs"));
        assert_eq!(block.operation.before_text, "old line");
        assert_eq!(block.operation.after_text, "new line");
    }

    #[test]
    fn parses_block_with_filename_on_fence_line() {
        let response = "```src/main.rs\n<<<<<<< SEARCH\nold\n=======\nnew\n>>>>>>> REPLACE\n```\n";
        let outcome = parse(response);
        assert_eq!(outcome.blocks.len(), 1);
        assert_eq!(outcome.blocks[0].raw_filename.as_deref(), Some("src/main.rs"));
    }

    #[test]
    fn parses_multiple_blocks_in_one_response() {
        let response = "a.txt\n<<<<<<< SEARCH\none\n=======\nONE\n>>>>>>> REPLACE\nb.txt\n<<<<<<< SEARCH\ntwo\n=======\nTWO\n>>>>>>> REPLACE\n";
        let outcome = parse(response);
        assert_eq!(outcome.blocks.len(), 2);
        assert_eq!(outcome.blocks[0].raw_filename.as_deref(), Some("a.txt"));
        assert_eq!(outcome.blocks[1].raw_filename.as_deref(), Some("b.txt"));
    }

    #[test]
    fn unclosed_block_is_reported_without_dropping_earlier_blocks() {
        let response = "a.txt\n<<<<<<< SEARCH\none\n=======\nONE\n>>>>>>> REPLACE\nb.txt\n<<<<<<< SEARCH\ntwo\n=======\nTWO\n";
        let outcome = parse(response);
        assert_eq!(outcome.blocks.len(), 1);
        assert!(outcome.parse_error.is_some());
    }

    #[test]
    fn whole_file_marker_is_classified_by_the_parser() {
        let response = "new.txt\n<<<<<<< SEARCH\nBRK_ENTIRE_FILE\n=======\nfull contents\n>>>>>>> REPLACE\n";
        let outcome = parse(response);
        assert_eq!(outcome.blocks.len(), 1);
        assert_eq!(outcome.blocks[0].operation.operation_kind, OperationKind::WholeFile);
    }

    #[test]
    fn missing_filename_is_not_fatal_at_parse_time() {
        let response = "<<<<<<< SEARCH\nold\n=======\nnew\n>>>>>>> REPLACE\n";
        let outcome = parse(response);
        assert_eq!(outcome.blocks.len(), 1);
        assert!(outcome.blocks[0].raw_filename.is_none());
    }

    #[test]
    fn forgiving_divider_block_with_filename_preceding_fence_parses_cleanly() {
        let response = "src/main.rs\n```\n<<<<<<< SEARCH\nfn old() {}\n=======\nfn new() {}\n>>>>>>> REPLACE\n```\n";
        let outcome = parse(response);
        assert_eq!(outcome.blocks.len(), 1);
        assert!(outcome.parse_error.is_none());
        assert_eq!(outcome.blocks[0].raw_filename.as_deref(), Some("src/main.rs"));
        assert_eq!(outcome.blocks[0].operation.before_text, "fn old() {}");
        assert_eq!(outcome.blocks[0].operation.after_text, "fn new() {}");
    }

    #[test]
    fn recover_forgiving_divider_splits_on_sole_standalone_divider_line() {
        let lines: Vec<String> = vec!["before a".to_string(), "=======".to_string(), "after a".to_string()];
        let (before, after) = recover_forgiving_divider(&lines).unwrap();
        assert_eq!(before, "before a");
        assert_eq!(after, "after a");
    }

    #[test]
    fn recover_forgiving_divider_rejects_zero_or_multiple_dividers() {
        let none: Vec<String> = vec!["no divider here".to_string()];
        assert!(recover_forgiving_divider(&none).is_none());

        let many: Vec<String> = vec!["=======".to_string(), "mid".to_string(), "=======".to_string()];
        assert!(recover_forgiving_divider(&many).is_none());
    }

    #[test]
    fn no_blocks_in_plain_response_yields_parse_error() {
        let outcome = parse("just some prose, no blocks here");
        assert!(outcome.blocks.is_empty());
        assert!(outcome.parse_error.is_some());
    }
}
