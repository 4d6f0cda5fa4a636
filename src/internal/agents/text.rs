//! Three-way line-based text merge.
//!
//! Builds its own longest-common-subsequence table rather than delegating to
//! a diffing crate: the block-boundary and conflict-marker behavior (and the
//! idempotence laws merge(a,a,x) = x and merge(a,x,a) = x) depend on exact
//! control over how insertions are anchored to ancestor line positions,
//! which an off-the-shelf diff crate does not expose.

use std::collections::HashMap;

use crate::errors::Result;
use crate::id::Id;
use crate::internal::content::{Text, TEXT_TYPE};

use super::{Agent, MergeConflict, MergeOutcome};

pub struct TextAgent;

impl Agent for TextAgent {
    fn type_tag(&self) -> &'static str {
        TEXT_TYPE
    }

    fn merge(&self, artifact_id: &Id, ancestor: &str, source_version: &Id, source: &str, target_version: &Id, target: &str) -> Result<MergeOutcome> {
        let ancestor = Text::decode(ancestor)?;
        let source = Text::decode(source)?;
        let target = Text::decode(target)?;

        let (proposed_lines, conflicts) = merge_lines(artifact_id, &ancestor.lines, source_version, &source.lines, target_version, &target.lines);
        let proposed = Text { lines: proposed_lines };
        Ok(MergeOutcome { proposed_content: proposed.encode()?, conflicts })
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

/// Longest-common-subsequence edit script from `a` to `b`, walked in
/// ancestor-index order. Ties between deleting and inserting favor deletion
/// first, which keeps the script deterministic.
fn diff_ops(a: &[String], b: &[String]) -> Vec<Op> {
    let n = a.len();
    let m = b.len();
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if a[i] == b[j] { dp[i + 1][j + 1] + 1 } else { dp[i + 1][j].max(dp[i][j + 1]) };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(Op::Equal(i, j));
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            ops.push(Op::Delete(i));
            i += 1;
        } else {
            ops.push(Op::Insert(j));
            j += 1;
        }
    }
    while i < n {
        ops.push(Op::Delete(i));
        i += 1;
    }
    while j < m {
        ops.push(Op::Insert(j));
        j += 1;
    }
    ops
}

/// For one side's diff against the ancestor: `keep[i]` is `Some(side_index)`
/// if ancestor line `i` survives unchanged on this side, `None` if deleted.
/// `inserts[i]` holds the lines this side inserts immediately before
/// ancestor line `i` (or, for `i == ancestor.len()`, after the last line).
fn keep_and_inserts(ops: &[Op], ancestor_len: usize, side: &[String]) -> (Vec<Option<usize>>, HashMap<usize, Vec<String>>) {
    let mut keep = vec![None; ancestor_len];
    let mut inserts: HashMap<usize, Vec<String>> = HashMap::new();
    let mut buffer: Vec<String> = Vec::new();
    for op in ops {
        match *op {
            Op::Equal(ai, si) => {
                if !buffer.is_empty() {
                    inserts.entry(ai).or_default().extend(buffer.drain(..));
                }
                keep[ai] = Some(si);
            }
            Op::Delete(ai) => {
                keep[ai] = None;
            }
            Op::Insert(si) => buffer.push(side[si].clone()),
        }
    }
    if !buffer.is_empty() {
        inserts.entry(ancestor_len).or_default().extend(buffer);
    }
    (keep, inserts)
}

#[allow(clippy::too_many_arguments)]
fn merge_lines(artifact_id: &Id, ancestor: &[String], source_version: &Id, source: &[String], target_version: &Id, target: &[String]) -> (Vec<String>, Vec<MergeConflict>) {
    let anc_len = ancestor.len();
    let src_ops = diff_ops(ancestor, source);
    let tgt_ops = diff_ops(ancestor, target);
    let (src_keep, src_inserts) = keep_and_inserts(&src_ops, anc_len, source);
    let (tgt_keep, tgt_inserts) = keep_and_inserts(&tgt_ops, anc_len, target);

    let mut output = Vec::new();
    let mut conflicts = Vec::new();
    let mut pending_ancestor_block: Vec<String> = Vec::new();

    for i in 0..=anc_len {
        match (src_inserts.get(&i), tgt_inserts.get(&i)) {
            (None, None) => {}
            (Some(s), None) => {
                output.extend(s.iter().cloned());
                pending_ancestor_block.clear();
            }
            (None, Some(t)) => {
                output.extend(t.iter().cloned());
                pending_ancestor_block.clear();
            }
            (Some(s), Some(t)) => {
                if s == t {
                    output.extend(s.iter().cloned());
                } else {
                    emit_conflict_markers(&mut output, s, t);
                    conflicts.push(make_conflict(artifact_id, source_version, target_version, s, t, &pending_ancestor_block));
                }
                pending_ancestor_block.clear();
            }
        }
        if i < anc_len {
            match (src_keep[i], tgt_keep[i]) {
                (Some(_), Some(_)) => output.push(ancestor[i].clone()),
                (Some(_), None) | (None, Some(_)) | (None, None) => pending_ancestor_block.push(ancestor[i].clone()),
            }
        }
    }

    (output, conflicts)
}

fn emit_conflict_markers(output: &mut Vec<String>, source_lines: &[String], target_lines: &[String]) {
    output.push("<<<<<<< source\n".to_string());
    output.extend(source_lines.iter().cloned());
    output.push("=======\n".to_string());
    output.extend(target_lines.iter().cloned());
    output.push(">>>>>>> target\n".to_string());
}

fn make_conflict(artifact_id: &Id, source_version: &Id, target_version: &Id, source_lines: &[String], target_lines: &[String], ancestor_block: &[String]) -> MergeConflict {
    let details = serde_json::to_string(&serde_json::json!({
        "source_lines": source_lines,
        "target_lines": target_lines,
        "ancestor_block": ancestor_block,
    }))
    .unwrap_or_default();
    MergeConflict::new(artifact_id.clone(), TEXT_TYPE, source_version.clone(), target_version.clone(), details)
}
