use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::application::statement::split_statements;
use crate::domain::ports::DataSource;
use crate::domain::report::FileImport;
use crate::domain::taxonomy::{decode, TaxonomyBlock};

/// Statements selected from one tagged stream, before execution.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplayPlan {
    pub statements: Vec<String>,
    pub blocks_replayed: Vec<TaxonomyBlock>,
    pub blocks_skipped: usize,
    /// Unterminated text dropped from the end of a segment.
    pub dropped: Vec<String>,
}

/// Replays only the selected blocks of a taxonomy stream.
pub struct BlockFilterReplayer {
    selected: BTreeSet<TaxonomyBlock>,
}

impl BlockFilterReplayer {
    pub fn new(selected: BTreeSet<TaxonomyBlock>) -> Self {
        Self { selected }
    }

    /// Decode `text` and collect the statements of selected segments, in
    /// stream order. The preamble is never part of the plan.
    pub fn plan(&self, text: &str) -> ReplayPlan {
        let stream = decode(text);
        let mut plan = ReplayPlan::default();

        if !stream.preamble.trim().is_empty() {
            debug!("Ignoring {} byte(s) before the first marker", stream.preamble.len());
        }

        for segment in stream.segments {
            if !self.selected.contains(&segment.block) {
                plan.blocks_skipped += 1;
                continue;
            }
            let (statements, tail) = split_statements(&segment.payload);
            plan.statements.extend(statements);
            plan.blocks_replayed.push(segment.block);
            if let Some(tail) = tail {
                plan.dropped.push(tail);
            }
        }
        plan
    }

    /// Plan `text`, execute it against `dest`, and record the result in `into`.
    pub async fn replay(&self, text: &str, dest: &dyn DataSource, into: &mut FileImport) {
        let plan = self.plan(text);
        for tail in &plan.dropped {
            warn!(
                group = %into.group,
                bytes = tail.len(),
                "dropping incomplete trailing statement"
            );
        }
        into.dropped_tail |= !plan.dropped.is_empty();
        into.blocks_skipped += plan.blocks_skipped;
        into.blocks_replayed.extend(plan.blocks_replayed.iter().copied());
        into.outcome.merge(dest.execute_batch(&plan.statements).await);
    }
}

/// Execute every complete statement of `text` as-is.
pub async fn replay_raw(text: &str, dest: &dyn DataSource, into: &mut FileImport) {
    let (statements, tail) = split_statements(text);
    if let Some(tail) = tail {
        warn!(
            group = %into.group,
            bytes = tail.len(),
            "dropping incomplete trailing statement"
        );
        into.dropped_tail = true;
    }
    into.outcome.merge(dest.execute_batch(&statements).await);
}
