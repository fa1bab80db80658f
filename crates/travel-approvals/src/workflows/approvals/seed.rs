//! Loads approver chains into the definition store, either from a CSV export kept by the travel
//! desk or from the built-in standard chains.
//!
//! CSV layout: one row per step with the headers `Tenant,Kind,Name,Step Order,Approver`. Rows
//! sharing tenant, kind and name form one definition; every seeded definition is registered as
//! active, so a file naming two definitions for the same tenant and kind is refused. A refused
//! file registers nothing.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::definitions::{DefinitionError, InMemoryDefinitionStore, NewDefinition};
use super::domain::{
    StepTemplate, TenantId, UnknownWorkflowKind, WorkflowDefinition, WorkflowKind,
};

#[derive(Debug, thiserror::Error)]
pub enum SeedImportError {
    #[error("failed to read definition seed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid definition seed CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("definition seed row {row}: {source}")]
    Kind {
        row: usize,
        source: UnknownWorkflowKind,
    },
    #[error("definition seed row {row}: tenant, name and approver must not be empty")]
    MissingValue { row: usize },
    #[error("could not register seeded definition: {0}")]
    Definition(#[from] DefinitionError),
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    #[serde(rename = "Tenant")]
    tenant: String,
    #[serde(rename = "Kind")]
    kind: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Step Order")]
    step_order: u32,
    #[serde(rename = "Approver")]
    approver: String,
}

pub struct DefinitionSeedImporter;

impl DefinitionSeedImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        store: &InMemoryDefinitionStore,
    ) -> Result<Vec<WorkflowDefinition>, SeedImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, store)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        store: &InMemoryDefinitionStore,
    ) -> Result<Vec<WorkflowDefinition>, SeedImportError> {
        let definitions = Self::parse(reader)?;
        Ok(store.register_all(definitions)?)
    }

    /// Groups rows into definitions without touching any store.
    pub fn parse<R: Read>(reader: R) -> Result<Vec<NewDefinition>, SeedImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut order: Vec<(TenantId, WorkflowKind, String)> = Vec::new();
        let mut grouped: BTreeMap<(TenantId, WorkflowKind, String), Vec<StepTemplate>> =
            BTreeMap::new();

        for (index, record) in csv_reader.deserialize::<SeedRow>().enumerate() {
            let row = record?;
            // header is line 1
            let line = index + 2;
            if row.tenant.is_empty() || row.name.is_empty() || row.approver.is_empty() {
                return Err(SeedImportError::MissingValue { row: line });
            }
            let kind = row
                .kind
                .parse::<WorkflowKind>()
                .map_err(|source| SeedImportError::Kind { row: line, source })?;

            let key = (TenantId(row.tenant), kind, row.name);
            let steps = grouped.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                Vec::new()
            });
            steps.push(StepTemplate::new(row.step_order, row.approver));
        }

        Ok(order
            .into_iter()
            .filter_map(|key| {
                let steps = grouped.remove(&key)?;
                let (tenant, kind, name) = key;
                Some(NewDefinition {
                    tenant,
                    kind,
                    name,
                    steps,
                    active: true,
                })
            })
            .collect())
    }
}

/// Default chains used when no seed file is configured.
pub fn standard_definitions(tenant: &TenantId) -> Vec<NewDefinition> {
    vec![
        NewDefinition {
            tenant: tenant.clone(),
            kind: WorkflowKind::TravelRequest,
            name: "Standard travel approval".to_string(),
            steps: vec![
                StepTemplate::new(1, "line-manager"),
                StepTemplate::new(2, "travel-desk"),
            ],
            active: true,
        },
        NewDefinition {
            tenant: tenant.clone(),
            kind: WorkflowKind::ExpenseClaim,
            name: "Standard expense claim approval".to_string(),
            steps: vec![
                StepTemplate::new(1, "line-manager"),
                StepTemplate::new(2, "finance-controller"),
            ],
            active: true,
        },
        NewDefinition {
            tenant: tenant.clone(),
            kind: WorkflowKind::PerDiem,
            name: "Standard per-diem approval".to_string(),
            steps: vec![
                StepTemplate::new(1, "line-manager"),
                StepTemplate::new(2, "finance-controller"),
                StepTemplate::new(3, "treasury"),
            ],
            active: true,
        },
    ]
}
