use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::domain::{ActorId, ApprovalRecord, ApprovalStatus, SubjectId};
use super::subjects::ApprovalSubject;

/// A subject together with its approval records: the unit that is locked and committed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectLedger<S> {
    pub subject: S,
    pub records: Vec<ApprovalRecord>,
}

impl<S> SubjectLedger<S> {
    pub fn new(subject: S) -> Self {
        Self {
            subject,
            records: Vec::new(),
        }
    }

    /// The currently OPEN record, if the instance is unresolved.
    pub fn cursor(&self) -> Option<&ApprovalRecord> {
        self.records
            .iter()
            .find(|record| record.status == ApprovalStatus::Open)
    }
}

/// Storage abstraction for subjects and their approval records.
pub trait ApprovalStore<S: ApprovalSubject>: Send + Sync {
    /// Runs `work` with exclusive access to a working copy of the subject's ledger.
    ///
    /// The copy replaces the stored ledger only when `work` returns `Ok`; on error the stored
    /// ledger is left exactly as it was.
    fn transact<T, E, F>(&self, id: &SubjectId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut SubjectLedger<S>) -> Result<T, E>,
        E: From<RepositoryError>;

    fn load(&self, id: &SubjectId) -> Result<Option<SubjectLedger<S>>, RepositoryError>;

    fn insert_subject(&self, subject: S) -> Result<(), RepositoryError>;

    /// Subjects whose OPEN record is assigned to `actor`.
    fn open_for(&self, actor: &ActorId) -> Result<Vec<SubjectId>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("subject {0} not found")]
    SubjectNotFound(SubjectId),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("approval store lock poisoned".to_string())
}

/// In-process store; each ledger sits behind its own lock so transitions on different subjects
/// never contend.
pub struct MemoryApprovalStore<S> {
    ledgers: Mutex<HashMap<SubjectId, Arc<Mutex<SubjectLedger<S>>>>>,
}

impl<S> Default for MemoryApprovalStore<S> {
    fn default() -> Self {
        Self {
            ledgers: Mutex::new(HashMap::new()),
        }
    }
}

impl<S: ApprovalSubject> MemoryApprovalStore<S> {
    fn slot(&self, id: &SubjectId) -> Result<Arc<Mutex<SubjectLedger<S>>>, RepositoryError> {
        let guard = self.ledgers.lock().map_err(|_| poisoned())?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::SubjectNotFound(id.clone()))
    }

    fn slots(&self) -> Result<Vec<Arc<Mutex<SubjectLedger<S>>>>, RepositoryError> {
        let guard = self.ledgers.lock().map_err(|_| poisoned())?;
        Ok(guard.values().cloned().collect())
    }
}

impl<S: ApprovalSubject> ApprovalStore<S> for MemoryApprovalStore<S> {
    fn transact<T, E, F>(&self, id: &SubjectId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut SubjectLedger<S>) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let slot = self.slot(id)?;
        let mut guard = slot.lock().map_err(|_| poisoned())?;
        let mut working = guard.clone();
        let output = work(&mut working)?;
        *guard = working;
        Ok(output)
    }

    fn load(&self, id: &SubjectId) -> Result<Option<SubjectLedger<S>>, RepositoryError> {
        let slot = match self.slot(id) {
            Ok(slot) => slot,
            Err(RepositoryError::SubjectNotFound(_)) => return Ok(None),
            Err(other) => return Err(other),
        };
        let guard = slot.lock().map_err(|_| poisoned())?;
        Ok(Some(guard.clone()))
    }

    fn insert_subject(&self, subject: S) -> Result<(), RepositoryError> {
        let mut guard = self.ledgers.lock().map_err(|_| poisoned())?;
        if guard.contains_key(subject.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(
            subject.id().clone(),
            Arc::new(Mutex::new(SubjectLedger::new(subject))),
        );
        Ok(())
    }

    fn open_for(&self, actor: &ActorId) -> Result<Vec<SubjectId>, RepositoryError> {
        let mut subjects = Vec::new();
        for slot in self.slots()? {
            let ledger = slot.lock().map_err(|_| poisoned())?;
            if ledger
                .cursor()
                .is_some_and(|record| &record.approver == actor)
            {
                subjects.push(ledger.subject.id().clone());
            }
        }
        subjects.sort();
        Ok(subjects)
    }
}
