// Orchestrator constants (ADR: No magic values)
use std::time::Duration;

/// Process-wide variable carrying the canonical JSON of the current request
pub const DEFAULT_HANDOFF_VAR: &str = "USER_INPUT_PAYLOAD";

/// Hard bound on a single unit run (2 minutes)
pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default unit definition, relative to the working directory
pub const DEFAULT_DEFINITION: &str = "Finance_data_web.ipynb";

/// Name of the file the unit writes its prediction to
pub const DEFAULT_RESULT_FILE: &str = "user_prediction.json";
