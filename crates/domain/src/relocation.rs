//! Moving an entity to another partition.
//!
//! The backend only offers atomic writes within one partition, so a move is
//! a delete and an insert issued one after the other. Between the two calls
//! the entity is either missing or visible twice, depending on the order;
//! [`RelocationStrategy`] picks which of the two windows the caller accepts.

use common::{EntityKey, PartitionId};
use table_store::{TableBackend, TableEntity, TableRepository, TableStoreError};

use crate::error::{DomainError, Result};

/// Order of the two writes that make up a relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelocationStrategy {
    /// Delete the old row, then insert the new one. A failed insert loses
    /// the entity.
    #[default]
    DeleteThenInsert,

    /// Insert the new row, then delete the old one. A failed delete leaves
    /// the entity in both partitions.
    InsertThenDelete,
}

impl RelocationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelocationStrategy::DeleteThenInsert => "delete-first",
            RelocationStrategy::InsertThenDelete => "insert-first",
        }
    }
}

impl std::fmt::Display for RelocationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelocationStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete-first" | "delete-then-insert" => Ok(RelocationStrategy::DeleteThenInsert),
            "insert-first" | "insert-then-delete" => Ok(RelocationStrategy::InsertThenDelete),
            other => Err(format!("unknown relocation strategy: {other}")),
        }
    }
}

/// Saves `entity`, moving it to `new_partition` if that differs from its
/// current partition.
///
/// A same-partition save (compared case-insensitively) is a plain
/// version-checked update. A move re-reads the stored row first and fails
/// with `ConcurrencyConflict` if the entity's etag is stale, so a move never
/// overwrites someone else's write. The unique id and every other field are
/// carried over unchanged.
#[tracing::instrument(
    skip(repo, entity, new_partition, strategy),
    fields(table = repo.table(), key = %entity.key(), to = %new_partition, strategy = %strategy)
)]
pub async fn save_relocating<T, B>(
    repo: &TableRepository<T, B>,
    entity: T,
    new_partition: PartitionId,
    strategy: RelocationStrategy,
) -> Result<T>
where
    T: TableEntity,
    B: TableBackend,
{
    if entity.key().partition_id.eq_ignore_case(&new_partition) {
        return Ok(repo.update(&entity).await?);
    }

    let from = entity.key().clone();
    let expected = entity
        .metadata()
        .etag
        .clone()
        .ok_or_else(|| TableStoreError::MissingVersion { key: from.clone() })?;

    let stored = repo
        .get(&from.partition_id, &from.unique_id)
        .await?
        .ok_or_else(|| DomainError::NotFound {
            table: repo.table().to_string(),
            key: from.clone(),
        })?;
    if let Some(actual) = stored.metadata().etag.clone()
        && actual != expected
    {
        return Err(DomainError::ConcurrencyConflict {
            key: from,
            expected,
            actual,
        });
    }

    let to = EntityKey::new(new_partition, from.unique_id.clone());
    let mut moved = entity;
    *moved.key_mut() = to.clone();
    *moved.metadata_mut() = Default::default();

    let saved = match strategy {
        RelocationStrategy::DeleteThenInsert => {
            repo.delete(&from.partition_id, &from.unique_id).await?;
            repo.insert(&moved)
                .await
                .map_err(|e| inconsistency(repo.table(), &from, &to, "insert after delete", e))?
        }
        RelocationStrategy::InsertThenDelete => {
            let inserted = repo.insert(&moved).await?;
            repo.delete(&from.partition_id, &from.unique_id)
                .await
                .map_err(|e| inconsistency(repo.table(), &from, &to, "delete after insert", e))?;
            inserted
        }
    };

    metrics::counter!("relocations_total", "table" => repo.table().to_string()).increment(1);
    tracing::info!(from = %from, to = %to, "Entity relocated");
    Ok(saved)
}

fn inconsistency(
    table: &str,
    from: &EntityKey,
    to: &EntityKey,
    step: &str,
    cause: TableStoreError,
) -> DomainError {
    tracing::error!(
        table,
        from = %from,
        to = %to,
        step,
        error = %cause,
        "Relocation left storage inconsistent"
    );
    metrics::counter!("relocation_inconsistencies_total", "table" => table.to_string())
        .increment(1);

    DomainError::RelocationInconsistency {
        from: from.clone(),
        to: to.clone(),
        reason: format!("{step} failed: {cause}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use serde::{Deserialize, Serialize};
    use table_store::{InMemoryTableBackend, RowMetadata};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Pet {
        #[serde(flatten)]
        key: EntityKey,
        #[serde(flatten)]
        meta: RowMetadata,
        name: String,
    }

    impl TableEntity for Pet {
        fn key(&self) -> &EntityKey {
            &self.key
        }
        fn key_mut(&mut self) -> &mut EntityKey {
            &mut self.key
        }
        fn metadata(&self) -> &RowMetadata {
            &self.meta
        }
        fn metadata_mut(&mut self) -> &mut RowMetadata {
            &mut self.meta
        }
    }

    async fn setup() -> (InMemoryTableBackend, TableRepository<Pet, InMemoryTableBackend>, Pet) {
        let backend = InMemoryTableBackend::new();
        let repo = TableRepository::new(backend.clone(), "Pets");
        let pet = repo
            .insert(&Pet {
                key: EntityKey::generate(PartitionId::new("CITY-DURBAN")),
                meta: RowMetadata::unsaved(),
                name: "Rex".to_string(),
            })
            .await
            .unwrap();
        (backend, repo, pet)
    }

    async fn count(repo: &TableRepository<Pet, InMemoryTableBackend>, partition: &str) -> usize {
        let pets: Vec<Pet> = repo
            .scan_partition(&PartitionId::new(partition))
            .try_collect()
            .await
            .unwrap();
        pets.len()
    }

    #[test]
    fn strategy_parses_config_values() {
        assert_eq!(
            "delete-first".parse::<RelocationStrategy>().unwrap(),
            RelocationStrategy::DeleteThenInsert
        );
        assert_eq!(
            "Insert-First".parse::<RelocationStrategy>().unwrap(),
            RelocationStrategy::InsertThenDelete
        );
        assert!("sideways".parse::<RelocationStrategy>().is_err());
        assert_eq!(
            RelocationStrategy::default(),
            RelocationStrategy::DeleteThenInsert
        );
    }

    #[tokio::test]
    async fn same_partition_is_plain_update() {
        let (_, repo, mut pet) = setup().await;
        pet.name = "Max".to_string();

        let saved = save_relocating(
            &repo,
            pet.clone(),
            PartitionId::new("city-durban"),
            RelocationStrategy::default(),
        )
        .await
        .unwrap();

        assert_eq!(saved.key, pet.key);
        assert_ne!(saved.meta.etag, pet.meta.etag);
        assert_eq!(count(&repo, "CITY-DURBAN").await, 1);
    }

    #[tokio::test]
    async fn moves_with_either_strategy() {
        for strategy in [
            RelocationStrategy::DeleteThenInsert,
            RelocationStrategy::InsertThenDelete,
        ] {
            let (_, repo, pet) = setup().await;
            let moved = save_relocating(
                &repo,
                pet.clone(),
                PartitionId::new("CITY-CAPE TOWN"),
                strategy,
            )
            .await
            .unwrap();

            assert_eq!(moved.key.unique_id, pet.key.unique_id);
            assert_eq!(moved.key.partition_id.as_str(), "CITY-CAPE TOWN");
            assert_eq!(moved.name, "Rex");
            assert_eq!(count(&repo, "CITY-DURBAN").await, 0);
            assert_eq!(count(&repo, "CITY-CAPE TOWN").await, 1);
        }
    }

    #[tokio::test]
    async fn stale_entity_is_not_moved() {
        let (_, repo, pet) = setup().await;
        let mut other = pet.clone();
        other.name = "Other".to_string();
        repo.update(&other).await.unwrap();

        let result = save_relocating(
            &repo,
            pet,
            PartitionId::new("CITY-CAPE TOWN"),
            RelocationStrategy::default(),
        )
        .await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { .. })
        ));
        assert_eq!(count(&repo, "CITY-DURBAN").await, 1);
        assert_eq!(count(&repo, "CITY-CAPE TOWN").await, 0);
    }

    #[tokio::test]
    async fn failed_insert_after_delete_is_inconsistency() {
        let (backend, repo, pet) = setup().await;
        backend.set_fail_on_insert(true);

        let result = save_relocating(
            &repo,
            pet,
            PartitionId::new("CITY-CAPE TOWN"),
            RelocationStrategy::DeleteThenInsert,
        )
        .await;

        assert!(matches!(
            result,
            Err(DomainError::RelocationInconsistency { .. })
        ));
        // The entity is gone from both partitions
        assert_eq!(backend.row_count("Pets").await, 0);
    }

    #[tokio::test]
    async fn failed_insert_first_changes_nothing() {
        let (backend, repo, pet) = setup().await;
        backend.set_fail_on_insert(true);

        let result = save_relocating(
            &repo,
            pet,
            PartitionId::new("CITY-CAPE TOWN"),
            RelocationStrategy::InsertThenDelete,
        )
        .await;

        assert!(matches!(result, Err(DomainError::Store(_))));
        assert_eq!(count(&repo, "CITY-DURBAN").await, 1);
    }

    #[tokio::test]
    async fn failed_delete_after_insert_is_inconsistency() {
        let (backend, repo, pet) = setup().await;
        backend.set_fail_on_delete(true);

        let result = save_relocating(
            &repo,
            pet,
            PartitionId::new("CITY-CAPE TOWN"),
            RelocationStrategy::InsertThenDelete,
        )
        .await;

        assert!(matches!(
            result,
            Err(DomainError::RelocationInconsistency { .. })
        ));
        // Visible in both partitions
        assert_eq!(backend.row_count("Pets").await, 2);
    }
}
