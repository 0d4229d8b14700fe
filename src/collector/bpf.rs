use crate::collector::counter_kind::CounterKind;
use crate::collector::error::CollectorError;

/// Number of per-CPU tick slots carried in a [`BpfEvent`].
pub const CPU_VECTOR_SIZE: usize = 128;
/// Fixed width of the `command` field, in bytes.
pub const COMMAND_LEN: usize = 16;

const EVENT_LEN: usize = 64 + CPU_VECTOR_SIZE * 2;

/// Fixed binary layout the BPF program exports, little-endian:
///
/// | offset | field              | type       |
/// |-------:|--------------------|------------|
/// |   0    | cgroup_pid         | u64        |
/// |   8    | pid                | u64        |
/// |  16    | process_run_time   | u64 ns     |
/// |  24    | cpu_cycles         | u64        |
/// |  32    | cpu_instructions   | u64        |
/// |  40    | cache_misses       | u64        |
/// |  48    | command            | [u8; 16]   |
/// |  64    | cpu_time           | [u16; 128] |
///
/// This event is drained and never stored — the sampler copies whatever it
/// needs into `PodEnergy` before moving to the next event.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BpfEvent {
    pub cgroup_pid: u64,
    pub pid: u64,
    pub process_run_time_ns: u64,
    pub cpu_cycles: u64,
    pub cpu_instructions: u64,
    pub cache_misses: u64,
    pub command: [u8; COMMAND_LEN],
    pub cpu_time: [u16; CPU_VECTOR_SIZE],
}

unsafe impl plain::Plain for BpfEvent {}

impl BpfEvent {
    /// Decodes one fixed-layout record from `bytes`. Rejects anything
    /// shorter than the expected record size rather than attempting a
    /// partial decode.
    pub fn decode(bytes: &[u8]) -> Result<Self, CollectorError> {
        if bytes.len() < EVENT_LEN {
            return Err(CollectorError::Decode(format!(
                "expected at least {EVENT_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut event = BpfEvent::default();
        plain::copy_from_bytes(&mut event, &bytes[..EVENT_LEN])
            .map_err(|_| CollectorError::Decode("copy_from_bytes failed".to_string()))?;
        Ok(event)
    }

    /// The process command name, trimmed of trailing NUL padding.
    pub fn command_str(&self) -> String {
        let end = self.command.iter().position(|&b| b == 0).unwrap_or(COMMAND_LEN);
        String::from_utf8_lossy(&self.command[..end]).into_owned()
    }
}

/// A drained BPF event table: iterate then clear, once per tick.
pub trait BpfEventTable: Send + Sync {
    /// Raw per-event byte slices, in whatever order the kernel table
    /// yields them. Each is fed to [`BpfEvent::decode`].
    fn iter(&self) -> Vec<Vec<u8>>;
    fn delete_all(&mut self);
}

/// The companion per-CPU time table the attacher maintains alongside the
/// event table; it only needs clearing.
pub trait BpfTimeTable: Send + Sync {
    fn delete_all(&mut self);
}

/// Static capability bits the attacher advertises: whether frequency
/// weighting is available this build, and which hardware counters the
/// running kernel/BPF program actually reports.
#[derive(Debug, Clone)]
pub struct BpfCapabilities {
    pub enable_cpu_freq: bool,
    pub available_counters: Vec<CounterKind>,
}

impl Default for BpfCapabilities {
    fn default() -> Self {
        Self {
            enable_cpu_freq: false,
            available_counters: Vec::new(),
        }
    }
}

/// An event table with nothing queued and capabilities all disabled —
/// lets the sampler run end-to-end before a real BPF attacher is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubEventTable;

impl BpfEventTable for StubEventTable {
    fn iter(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }
    fn delete_all(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StubTimeTable;

impl BpfTimeTable for StubTimeTable {
    fn delete_all(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(event: &BpfEvent) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(EVENT_LEN);
        bytes.extend_from_slice(&event.cgroup_pid.to_ne_bytes());
        bytes.extend_from_slice(&event.pid.to_ne_bytes());
        bytes.extend_from_slice(&event.process_run_time_ns.to_ne_bytes());
        bytes.extend_from_slice(&event.cpu_cycles.to_ne_bytes());
        bytes.extend_from_slice(&event.cpu_instructions.to_ne_bytes());
        bytes.extend_from_slice(&event.cache_misses.to_ne_bytes());
        bytes.extend_from_slice(&event.command);
        for tick in event.cpu_time {
            bytes.extend_from_slice(&tick.to_ne_bytes());
        }
        bytes
    }

    #[test]
    fn decodes_a_well_formed_event() {
        let mut event = BpfEvent {
            cgroup_pid: 100,
            pid: 1000,
            process_run_time_ns: 1_000_000,
            cpu_cycles: 10,
            cpu_instructions: 20,
            cache_misses: 5,
            ..Default::default()
        };
        event.command[..4].copy_from_slice(b"curl");
        event.cpu_time[0] = 1000;

        let bytes = encode(&event);
        let decoded = BpfEvent::decode(&bytes).unwrap();

        assert_eq!(decoded, event);
        assert_eq!(decoded.command_str(), "curl");
    }

    #[test]
    fn rejects_a_short_payload() {
        let err = BpfEvent::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, CollectorError::Decode(_)));
    }

    #[test]
    fn stub_table_yields_nothing() {
        let table = StubEventTable;
        assert!(table.iter().is_empty());
    }
}
