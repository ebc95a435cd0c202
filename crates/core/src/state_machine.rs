use partwatch_common::error::{PipelineError, Result};
use partwatch_common::types::ArticulumState;
use partwatch_common::ArticulumId;

use crate::store::Store;

/// Whether a transition between two states is ever legal, independent of
/// the current row's actual state. This is a fast-fail guard: the
/// conditional `UPDATE` below is what actually enforces the invariant
/// against concurrent writers.
fn is_legal(from: ArticulumState, to: ArticulumState) -> bool {
    use ArticulumState::*;
    matches!(
        (from, to),
        (New, CatalogParsing)
            | (CatalogParsing, CatalogParsed)
            | (CatalogParsing, New) // failed/returned catalog task
            | (CatalogParsed, Validating)
            | (Validating, Validated)
            | (Validating, RejectedByMinCount)
            | (Validating, CatalogParsed) // rollback_to_catalog_parsed
            | (Validated, ObjectParsing)
            | (ObjectParsing, Validated) // heartbeat recovery: last in-flight object task returned to queue
    )
}

/// Attempts `from -> to` as a single conditional update. An affected-row
/// count of zero means another worker already moved the row (or it was
/// never in `from`); the caller treats that as a lost race, not an error.
pub async fn transition(
    store: &Store,
    articulum_id: ArticulumId,
    from: ArticulumState,
    to: ArticulumState,
) -> Result<bool> {
    if !is_legal(from, to) {
        return Err(PipelineError::IllegalTransition {
            articulum: articulum_id.to_string(),
            from: from.as_db_str().to_string(),
            to: to.as_db_str().to_string(),
        });
    }

    let result = sqlx::query(
        "UPDATE articulums SET state = $1, state_updated_at = now() \
         WHERE id = $2 AND state = $3",
    )
    .bind(to.as_db_str())
    .bind(uuid::Uuid::from(articulum_id))
    .bind(from.as_db_str())
    .execute(store.pool())
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Moves an articulum back to `CatalogParsed` and discards every validation
/// result recorded for it, atomically. Used when the AI validation stage is
/// unavailable and the articulum must be re-run from scratch.
pub async fn rollback_to_catalog_parsed(store: &Store, articulum_id: ArticulumId) -> Result<bool> {
    let mut tx = store.pool().begin().await?;

    let result = sqlx::query(
        "UPDATE articulums SET state = 'catalog_parsed', state_updated_at = now() \
         WHERE id = $1 AND state = 'validating'",
    )
    .bind(uuid::Uuid::from(articulum_id))
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() != 1 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query("DELETE FROM validation_results WHERE articulum_id = $1")
        .bind(uuid::Uuid::from(articulum_id))
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ArticulumState::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        assert!(is_legal(New, CatalogParsing));
        assert!(is_legal(CatalogParsing, CatalogParsed));
        assert!(is_legal(CatalogParsed, Validating));
        assert!(is_legal(Validating, Validated));
        assert!(is_legal(Validated, ObjectParsing));
    }

    #[test]
    fn rejection_and_rollback_are_legal() {
        assert!(is_legal(Validating, RejectedByMinCount));
        assert!(is_legal(Validating, CatalogParsed));
    }

    #[test]
    fn skipping_a_stage_is_illegal() {
        assert!(!is_legal(New, CatalogParsed));
        assert!(!is_legal(New, Validated));
        assert!(!is_legal(CatalogParsed, ObjectParsing));
    }

    #[test]
    fn terminal_states_have_no_outbound_edges() {
        assert!(!is_legal(ObjectParsing, New));
        assert!(!is_legal(RejectedByMinCount, New));
        assert!(ObjectParsing.is_terminal());
        assert!(RejectedByMinCount.is_terminal());
    }
}
