//! Inclusion report queries.

use super::ApiError;
use txwatch_core::MonitorEngine;
use txwatch_types::InclusionReport;

/// GET /inclusion
pub async fn list_reports(engine: &MonitorEngine) -> Result<Vec<InclusionReport>, ApiError> {
	engine
		.reconciler()
		.reports()
		.await
		.map_err(|e| ApiError::Internal(e.to_string()))
}

/// GET /inclusion/{slot}
pub async fn latest_report(slot: &str, engine: &MonitorEngine) -> Result<InclusionReport, ApiError> {
	let slot = slot
		.parse::<u64>()
		.map_err(|e| ApiError::BadRequest(format!("Invalid slot '{}': {}", slot, e)))?;
	engine
		.reconciler()
		.latest_report(slot)
		.await
		.map_err(|e| ApiError::Internal(e.to_string()))?
		.ok_or_else(|| ApiError::NotFound(format!("No inclusion report for slot {}", slot)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::apis::tests_support::{engine, legacy_tx};
	use txwatch_types::{InclusionAnnouncement, Observation, TxHash};

	#[tokio::test]
	async fn test_reports_by_slot() {
		let engine = engine();
		let known = TxHash::repeat_byte(0x0a);
		engine
			.state()
			.upsert(&"geth".into(), known, &legacy_tx(10), Observation::Pending)
			.await
			.unwrap();
		engine
			.reconciler()
			.process(InclusionAnnouncement {
				slot: Some(99),
				transactions: vec![known, TxHash::repeat_byte(0x0c)],
				validator_index: None,
				signature: None,
			})
			.await
			.unwrap();

		let report = latest_report("99", &engine).await.unwrap();
		assert_eq!(report.included, vec![known]);
		assert_eq!(report.summary.missing, 1);
		assert_eq!(list_reports(&engine).await.unwrap().len(), 1);

		assert!(matches!(
			latest_report("100", &engine).await,
			Err(ApiError::NotFound(_))
		));
		assert!(matches!(
			latest_report("-1", &engine).await,
			Err(ApiError::BadRequest(_))
		));
	}
}
