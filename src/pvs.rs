//! Project-Version Specifier: parse/format of the four PVS shapes and
//! resolution to a concrete baseline version ID.
//!
//! A PVS addresses its project by ID (stable across renames) and its
//! history/change by human name (the names stashes already index by);
//! save points and baseline versions, which are never user-named, are
//! addressed directly by ID.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{DepotError, Result};
use crate::id::Id;
use crate::internal::stash::change::ChangeStash;
use crate::internal::stash::history::HistoryStash;
use crate::internal::stash::savepoint::SavePointStash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pvs {
    History { project: Id, history: String, step: Option<u64> },
    Change { project: Id, history: String, change: String },
    SavePoint { project: Id, history: String, save_id: Id },
    Baseline { project: Id, history: String, version_id: Id },
}

impl fmt::Display for Pvs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pvs::History { project, history, step: None } => write!(f, "history({project}@{history})"),
            Pvs::History { project, history, step: Some(step) } => write!(f, "history({project}@{history}@{step})"),
            Pvs::Change { project, history, change } => write!(f, "change({project}@{history}@{change})"),
            Pvs::SavePoint { project, history, save_id } => write!(f, "savePoint({project}@{history}@{save_id})"),
            Pvs::Baseline { project, history, version_id } => write!(f, "baseline({project}@{history}@{version_id})"),
        }
    }
}

impl FromStr for Pvs {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DepotError::InvalidParameter(format!("`{s}` is not a valid PVS"));
        let (kind, rest) = s.split_once('(').ok_or_else(invalid)?;
        let inner = rest.strip_suffix(')').ok_or_else(invalid)?;
        let parts: Vec<&str> = inner.split('@').collect();

        match (kind, parts.as_slice()) {
            ("history", [project, history]) => Ok(Pvs::History { project: project.parse()?, history: history.to_string(), step: None }),
            ("history", [project, history, step]) => Ok(Pvs::History {
                project: project.parse()?,
                history: history.to_string(),
                step: Some(step.parse().map_err(|_| invalid())?),
            }),
            ("change", [project, history, change]) => Ok(Pvs::Change { project: project.parse()?, history: history.to_string(), change: change.to_string() }),
            ("savePoint", [project, history, save_id]) => Ok(Pvs::SavePoint { project: project.parse()?, history: history.to_string(), save_id: save_id.parse()? }),
            ("baseline", [project, history, version_id]) => Ok(Pvs::Baseline { project: project.parse()?, history: history.to_string(), version_id: version_id.parse()? }),
            _ => Err(invalid()),
        }
    }
}

/// Resolves a [`Pvs`] to the baseline version ID it names.
pub struct PvsResolver {
    histories: Arc<HistoryStash>,
    changes: Arc<ChangeStash>,
    save_points: Arc<SavePointStash>,
}

impl PvsResolver {
    pub fn new(histories: Arc<HistoryStash>, changes: Arc<ChangeStash>, save_points: Arc<SavePointStash>) -> Self {
        PvsResolver { histories, changes, save_points }
    }

    pub fn resolve(&self, pvs: &Pvs) -> Result<Id> {
        match pvs {
            Pvs::History { project, history, step } => {
                let history = self.histories.retrieve_by_name(project, history)?;
                let step = match step {
                    Some(index) => {
                        let step_id = history
                            .step_ids
                            .get(*index as usize)
                            .ok_or_else(|| DepotError::NotFound(format!("history `{}` has no step {index}", history.name)))?;
                        self.histories.retrieve_step(step_id)?
                    }
                    None => self.histories.tip(&history)?,
                };
                Ok(step.baseline_version_id)
            }
            Pvs::Change { project, history, change } => {
                let history = self.histories.retrieve_by_name(project, history)?;
                let change = self.changes.retrieve_by_name(project, &history.id, change)?;
                let save_point_id = change
                    .save_point_ids
                    .last()
                    .ok_or_else(|| DepotError::NotFound(format!("change `{}` has no save points", change.name)))?;
                let save_point = self.save_points.retrieve(save_point_id)?;
                Ok(save_point.new_baseline_version_id)
            }
            Pvs::SavePoint { save_id, .. } => Ok(self.save_points.retrieve(save_id)?.new_baseline_version_id),
            Pvs::Baseline { version_id, .. } => Ok(version_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Kind;

    #[test]
    fn history_without_step_round_trips() {
        let pvs = Pvs::History { project: Id::new(Kind::Project), history: "main".to_string(), step: None };
        let rendered = pvs.to_string();
        let reparsed: Pvs = rendered.parse().unwrap();
        assert_eq!(pvs, reparsed);
    }

    #[test]
    fn all_shapes_round_trip() {
        let project = Id::new(Kind::Project);
        let cases = vec![
            Pvs::History { project: project.clone(), history: "main".into(), step: Some(3) },
            Pvs::Change { project: project.clone(), history: "main".into(), change: "work".into() },
            Pvs::SavePoint { project: project.clone(), history: "main".into(), save_id: Id::new(Kind::SavePoint) },
            Pvs::Baseline { project, history: "main".into(), version_id: Id::new(Kind::Version) },
        ];
        for pvs in cases {
            let reparsed: Pvs = pvs.to_string().parse().unwrap();
            assert_eq!(pvs, reparsed);
        }
    }

    #[test]
    fn rejects_malformed_shapes() {
        assert!("history(only-one-part)".parse::<Pvs>().is_err());
        assert!("bogus(a@b)".parse::<Pvs>().is_err());
        assert!("history(p@main@not-a-number)".parse::<Pvs>().is_err());
    }
}
