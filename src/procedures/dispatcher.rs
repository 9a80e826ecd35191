//! Sequential fan-out of batch procedures over the dataset types.

use super::{BatchAction, ProcedureCall, ProcedureRegistry};
use crate::warehouse::{bounded, ProcedureRunner, WarehouseError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How one dataset type fared.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success { data: Value },
    Skipped { details: String },
    Error { error: String },
}

/// One entry of a batch response, serialized as
/// `{"type": ..., "status": ..., <data|details|error>: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    #[serde(rename = "type")]
    pub dataset_type: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    runner: Arc<dyn ProcedureRunner>,
    registry: Arc<ProcedureRegistry>,
    call_timeout: Duration,
}

impl BatchDispatcher {
    pub fn new(
        runner: Arc<dyn ProcedureRunner>,
        registry: Arc<ProcedureRegistry>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            registry,
            call_timeout,
        }
    }

    pub fn registry(&self) -> &ProcedureRegistry {
        &self.registry
    }

    /// Run `action` for every dataset type, one at a time, in registry order.
    ///
    /// Always yields one entry per dataset type. A failure never stops the
    /// remaining calls.
    #[tracing::instrument(name = "run_batch", skip(self), fields(etl.action = %action))]
    pub async fn run(&self, action: BatchAction) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(self.registry.dataset_types().len());
        for dataset_type in self.registry.dataset_types() {
            let outcome = match self.registry.lookup(action, dataset_type) {
                Some(call) => self.invoke(dataset_type, &call).await,
                None => {
                    warn!("No {} procedure mapped for {}", action, dataset_type);
                    BatchOutcome {
                        dataset_type: dataset_type.clone(),
                        status: OutcomeStatus::Skipped {
                            details: format!("no {} procedure configured", action),
                        },
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Run the master pipeline once per dataset type.
    ///
    /// Only successful runs are returned; failures are logged and left out.
    #[tracing::instrument(name = "run_master_pipeline", skip(self))]
    pub async fn run_master_pipeline(&self) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::new();
        for dataset_type in self.registry.dataset_types() {
            let call = self.registry.master_pipeline(dataset_type);
            let outcome = self.invoke(dataset_type, &call).await;
            if outcome.is_success() {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Build the denormalized reporting table.
    #[tracing::instrument(name = "denormalize", skip(self))]
    pub async fn denormalize(&self) -> Result<Value, WarehouseError> {
        let call = self.registry.denormalize();
        info!("Calling {}", call.procedure);
        bounded(self.call_timeout, &call.procedure, self.runner.call(&call)).await
    }

    async fn invoke(&self, dataset_type: &str, call: &ProcedureCall) -> BatchOutcome {
        info!("Calling {} for {}", call.procedure, dataset_type);
        let status = match bounded(self.call_timeout, &call.procedure, self.runner.call(call)).await
        {
            Ok(data) => OutcomeStatus::Success { data },
            Err(e) if e.is_missing_procedure() => {
                warn!("Procedure {} not found; skipping {}", call.procedure, dataset_type);
                OutcomeStatus::Skipped {
                    details: e.to_string(),
                }
            }
            Err(e) => {
                error!("Procedure {} failed for {}: {}", call.procedure, dataset_type, e);
                OutcomeStatus::Error {
                    error: e.to_string(),
                }
            }
        };
        BatchOutcome {
            dataset_type: dataset_type.to_string(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::DatasetRegistry;
    use crate::procedures::ProcedureConfig;
    use crate::warehouse::MockWarehouse;
    use serde_json::json;

    fn dispatcher(warehouse: &Arc<MockWarehouse>) -> BatchDispatcher {
        let registry =
            ProcedureRegistry::new(&ProcedureConfig::default(), &DatasetRegistry::default())
                .unwrap();
        BatchDispatcher::new(
            warehouse.clone(),
            Arc::new(registry),
            Duration::from_secs(5),
        )
    }

    fn types(outcomes: &[BatchOutcome]) -> Vec<&str> {
        outcomes.iter().map(|o| o.dataset_type.as_str()).collect()
    }

    #[tokio::test]
    async fn test_clean_runs_every_dataset_in_order() {
        let warehouse = Arc::new(MockWarehouse::new());
        let outcomes = dispatcher(&warehouse).run(BatchAction::Clean).await;

        assert_eq!(
            types(&outcomes),
            ["airlines", "airports", "flights", "sales", "passengers"]
        );
        assert!(outcomes.iter().all(BatchOutcome::is_success));
        let called: Vec<String> = warehouse
            .procedure_calls()
            .into_iter()
            .map(|c| c.procedure)
            .collect();
        assert_eq!(
            called,
            [
                "sp_clean_airlines",
                "sp_clean_airports",
                "sp_clean_flights",
                "sp_clean_sales",
                "sp_clean_passengers"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_procedures_are_skipped() {
        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.mark_procedure_missing("sp_load_flights");
        warehouse.mark_procedure_missing("sp_load_sales");

        let outcomes = dispatcher(&warehouse).run(BatchAction::Load).await;

        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes.iter().filter(|o| o.is_skipped()).count(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 3);
        assert!(outcomes[2].is_skipped());
        assert!(outcomes[3].is_skipped());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_calls() {
        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.fail_procedure("sp_clean_airlines", "relation \"stg_airlines\" does not exist");

        let outcomes = dispatcher(&warehouse).run(BatchAction::Clean).await;

        assert_eq!(
            outcomes[0].status,
            OutcomeStatus::Error {
                error: "relation \"stg_airlines\" does not exist".to_string()
            }
        );
        assert!(outcomes[1..].iter().all(BatchOutcome::is_success));
        assert_eq!(warehouse.procedure_calls().len(), 5);
    }

    #[tokio::test]
    async fn test_master_pipeline_omits_failures() {
        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.set_procedure_result("sp_master_pipeline", json!({ "rows": 10 }));

        let outcomes = dispatcher(&warehouse).run_master_pipeline().await;
        assert_eq!(outcomes.len(), 5);

        let calls = warehouse.procedure_calls();
        assert_eq!(calls[3], ProcedureCall::for_dataset("sp_master_pipeline", "sales"));

        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.fail_procedure("sp_master_pipeline", "boom");
        assert!(dispatcher(&warehouse).run_master_pipeline().await.is_empty());
    }

    #[tokio::test]
    async fn test_denormalize_returns_result() {
        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.set_procedure_result("sp_build_denorm_table", json!("done"));

        let data = dispatcher(&warehouse).denormalize().await.unwrap();
        assert_eq!(data, json!("done"));
        assert_eq!(
            warehouse.procedure_calls(),
            vec![ProcedureCall::new("sp_build_denorm_table")]
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = BatchOutcome {
            dataset_type: "sales".to_string(),
            status: OutcomeStatus::Skipped {
                details: "procedure not found: sp_clean_sales".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "type": "sales",
                "status": "skipped",
                "details": "procedure not found: sp_clean_sales"
            })
        );

        let outcome = BatchOutcome {
            dataset_type: "airlines".to_string(),
            status: OutcomeStatus::Success { data: Value::Null },
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({ "type": "airlines", "status": "success", "data": null })
        );
    }
}
