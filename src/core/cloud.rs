//! Stubbed external collaborators: cloud-sync, language-server transport,
//! telemetry. Each is a trait with a no-op default so the CLI links and
//! runs standalone without a network implementation in this core.

/// Cloud-reported stack health, consulted by `list --status` filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudStatus {
    Unknown,
    Ok,
    Drifted,
    Failed,
}

/// The cloud-sync client interface. `NoopCloudSync` is the only
/// implementation shipped in this core; a real client is an external
/// collaborator outside this crate's scope.
pub trait CloudSync: Send + Sync {
    fn stack_status(&self, stack_path: &str) -> CloudStatus;
    fn report_run(&self, stack_path: &str, success: bool);
}

pub struct NoopCloudSync;

impl CloudSync for NoopCloudSync {
    fn stack_status(&self, _stack_path: &str) -> CloudStatus {
        CloudStatus::Unknown
    }

    fn report_run(&self, _stack_path: &str, _success: bool) {}
}

/// Telemetry sink interface; `NoopTelemetry` discards every event.
pub trait TelemetrySink: Send + Sync {
    fn record_event(&self, name: &str);
}

pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record_event(&self, _name: &str) {}
}

/// Language-server transport interface; stubbed, no real LSP loop.
pub trait LanguageServerTransport: Send + Sync {
    fn handle_request(&self, raw: &str) -> String;
}

pub struct NoopLanguageServer;

impl LanguageServerTransport for NoopLanguageServer {
    fn handle_request(&self, _raw: &str) -> String {
        String::new()
    }
}
