//! Binary artifacts never merge: any concurrent modification on both sides
//! is an unconditional conflict, resolved by keeping the target's content
//! verbatim in the proposal (the same "target wins the proposal" convention
//! [`super::baseline::BaselineAgent`] and [`super::directory::DirectoryAgent`]
//! use for their own `ModMod` conflicts).

use crate::errors::Result;
use crate::id::Id;
use crate::internal::content::BINARY_TYPE;

use super::{Agent, MergeConflict, MergeOutcome};

pub struct BinaryAgent;

impl Agent for BinaryAgent {
    fn type_tag(&self) -> &'static str {
        BINARY_TYPE
    }

    fn merge(&self, artifact_id: &Id, _ancestor: &str, source_version: &Id, _source: &str, target_version: &Id, target: &str) -> Result<MergeOutcome> {
        let conflict = MergeConflict::new(
            artifact_id.clone(),
            BINARY_TYPE,
            source_version.clone(),
            target_version.clone(),
            "\"binary artifacts cannot be merged\"".to_string(),
        );
        Ok(MergeOutcome { proposed_content: target.to_string(), conflicts: vec![conflict] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Kind;
    use crate::internal::content::Binary;

    #[test]
    fn always_conflicts_and_keeps_target_content() {
        let ancestor = Binary::new(vec![1, 2, 3]).encode().unwrap();
        let source = Binary::new(vec![1, 2, 3, 4]).encode().unwrap();
        let target = Binary::new(vec![1, 2, 3, 5]).encode().unwrap();

        let agent = BinaryAgent;
        let outcome = agent
            .merge(&Id::new(Kind::Artifact), &ancestor, &Id::new(Kind::Version), &source, &Id::new(Kind::Version), &target)
            .unwrap();

        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.proposed_content, target);
    }
}
