//! Atomic multi-entity save with optional dry run.

use crate::error::BatchError;
use crate::model::{Entity, EntitySnapshot, SaveOutcome};
use sqlx::{AnyConnection, Connection};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaveManyOptions {
    /// Run every save, then roll back regardless of the outcome.
    pub dry_run: bool,
}

impl SaveManyOptions {
    pub fn dry_run() -> Self {
        SaveManyOptions { dry_run: true }
    }
}

/// Transaction lifecycle: `Started -> {Committed, RolledBack}`. A batch whose
/// transaction never began fails with `BatchError::Begin` instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Started,
    Committed,
    RolledBack,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    pub state: BatchState,
    /// One outcome per entity, in input order.
    pub outcomes: Vec<SaveOutcome>,
}

/// Save `entities` in order inside one transaction. The first failure rolls
/// everything back and is returned; later entities are not attempted. On any
/// rollback every entity's in-memory state is restored to what it was before
/// the batch, so it agrees with the database again.
pub async fn save_many(
    conn: &mut AnyConnection,
    entities: &mut [Entity],
    options: SaveManyOptions,
) -> Result<BatchReport, BatchError> {
    let snapshots: Vec<EntitySnapshot> = entities.iter().map(Entity::snapshot).collect();

    let mut tx = conn.begin().await.map_err(BatchError::Begin)?;
    let mut state = BatchState::Started;
    tracing::debug!(count = entities.len(), dry_run = options.dry_run, state = ?state, "batch save");

    let mut outcomes = Vec::with_capacity(entities.len());
    for index in 0..entities.len() {
        let saved = entities[index].save(&mut tx).await;
        match saved {
            Ok(outcome) => outcomes.push(outcome),
            Err(source) => {
                if let Err(e) = tx.rollback().await {
                    tracing::error!(error = %e, index, "rollback after failed save also failed");
                }
                restore(entities, snapshots);
                tracing::debug!(index, "batch rolled back");
                return Err(BatchError::Save { index, source });
            }
        }
    }

    if options.dry_run {
        let rolled_back = tx.rollback().await;
        restore(entities, snapshots);
        rolled_back.map_err(BatchError::Rollback)?;
        state = BatchState::RolledBack;
    } else {
        if let Err(e) = tx.commit().await {
            restore(entities, snapshots);
            return Err(BatchError::Commit(e));
        }
        state = BatchState::Committed;
    }
    tracing::debug!(state = ?state, "batch finished");
    Ok(BatchReport { state, outcomes })
}

fn restore(entities: &mut [Entity], snapshots: Vec<EntitySnapshot>) {
    for (entity, snapshot) in entities.iter_mut().zip(snapshots) {
        entity.restore(snapshot);
    }
}
