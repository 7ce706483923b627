//! Metric names and labels reported by the processor.

/// Label for the changefeed id.
pub const CHANGEFEED_ID_LABEL: &str = "changefeed_id";

/// Label for the capture id.
pub const CAPTURE_ID_LABEL: &str = "capture_id";

/// Label distinguishing where a transaction was counted.
pub const STAGE_LABEL: &str = "stage";

/// Stage value for raw transactions observed from table pullers.
pub const STAGE_RECEIVED: &str = "received";

/// Stage value for transactions delivered to the sink.
pub const STAGE_EXECUTED: &str = "executed";

/// Gauge holding the local resolved timestamp of a processor.
pub const CDC_PROCESSOR_RESOLVED_TS: &str = "cdc_processor_resolved_ts";

/// Gauge holding the checkpoint timestamp of a processor.
pub const CDC_PROCESSOR_CHECKPOINT_TS: &str = "cdc_processor_checkpoint_ts";

/// Gauge holding the number of tables assigned to a processor.
pub const CDC_PROCESSOR_TABLE_COUNT: &str = "cdc_processor_table_count";

/// Counter of transactions handled by a processor, labelled by [`STAGE_LABEL`].
pub const CDC_PROCESSOR_TXNS_TOTAL: &str = "cdc_processor_txns_total";
