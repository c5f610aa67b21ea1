// PHASEPREDICT TELEMETRY COLLECTOR
// OWNS THE CALLING THREAD'S HARDWARE COUNTERS: INIT, GROUP, START, READ, RESET
//
// TWO LAYERS:
//   CounterBackend: THE RAW COUNTER INTERFACE. FAILURES ARE TYPED ERRORS.
//   CounterSet:     THE ADAPTER THE PREDICTOR USES. EVERY BACKEND FAILURE IS
//                   LOGGED AND SWALLOWED. A METRIC THAT FAILED TO OPEN IS
//                   SIMPLY ABSENT FROM EVERY READ. NOTHING HERE ABORTS.
//
// PerfBackend DRIVES LINUX perf_event_open DIRECTLY: ONE GROUP, CALLING THREAD
// ONLY, USER SPACE ONLY, READ WITH PERF_FORMAT_GROUP.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub type GroupHandle = usize;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("perf events unavailable: {0}")]
    Unsupported(String),
    #[error("unknown event {0}")]
    UnknownEvent(String),
    #[error("perf_event_open({name}) failed: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("no counter group {0}")]
    NoGroup(GroupHandle),
    #[error("counter group {0} has no events")]
    EmptyGroup(GroupHandle),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CounterState {
    Running,
    Stopped,
}

pub trait CounterBackend {
    fn init(&mut self) -> Result<(), CounterError>;
    fn register_thread(&mut self) -> Result<(), CounterError>;
    fn create_group(&mut self) -> Result<GroupHandle, CounterError>;
    // RESOLVE A SYMBOLIC NAME AND ADD IT TO THE GROUP
    fn add_event(&mut self, group: GroupHandle, name: &str) -> Result<(), CounterError>;
    fn start(&mut self, group: GroupHandle) -> Result<(), CounterError>;
    fn state(&self, group: GroupHandle) -> Result<CounterState, CounterError>;
    // ONE VALUE PER SUCCESSFULLY ADDED EVENT, IN ADD ORDER
    fn read(&mut self, group: GroupHandle) -> Result<Vec<i64>, CounterError>;
    fn reset(&mut self, group: GroupHandle) -> Result<(), CounterError>;
}

// --- EVENT RESOLUTION ---

const PERF_TYPE_HARDWARE: u32 = 0;
const PERF_TYPE_RAW: u32 = 4;

const PERF_COUNT_HW_CPU_CYCLES: u64 = 0;
const PERF_COUNT_HW_INSTRUCTIONS: u64 = 1;
const PERF_COUNT_HW_CACHE_REFERENCES: u64 = 2;
const PERF_COUNT_HW_CACHE_MISSES: u64 = 3;
const PERF_COUNT_HW_BRANCH_INSTRUCTIONS: u64 = 4;
const PERF_COUNT_HW_BRANCH_MISSES: u64 = 5;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EventCode {
    pub kind: u32,
    pub config: u64,
}

fn raw_event_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^perf_raw::r([0-9a-fA-F]{1,16})$").expect("raw event pattern is valid")
    })
}

// perf_raw::rXXXX -> RAW EVENT 0xXXXX. PAPI PRESETS -> GENERIC HARDWARE EVENTS.
pub fn resolve_event(name: &str) -> Option<EventCode> {
    let name = name.trim();
    if let Some(caps) = raw_event_pattern().captures(name) {
        let config = u64::from_str_radix(&caps[1], 16).ok()?;
        return Some(EventCode { kind: PERF_TYPE_RAW, config });
    }

    let config = match name {
        "PAPI_TOT_CYC" => PERF_COUNT_HW_CPU_CYCLES,
        "PAPI_TOT_INS" => PERF_COUNT_HW_INSTRUCTIONS,
        "PAPI_L3_TCA" => PERF_COUNT_HW_CACHE_REFERENCES,
        "PAPI_L3_TCM" => PERF_COUNT_HW_CACHE_MISSES,
        "PAPI_BR_CN" | "PAPI_BR_INS" => PERF_COUNT_HW_BRANCH_INSTRUCTIONS,
        "PAPI_BR_MSP" => PERF_COUNT_HW_BRANCH_MISSES,
        _ => return None,
    };
    Some(EventCode { kind: PERF_TYPE_HARDWARE, config })
}

// --- PERF_EVENT_OPEN ABI ---

// MATCHES struct perf_event_attr UP TO PERF_ATTR_SIZE_VER0 (64 BYTES)
#[repr(C)]
#[derive(Default, Clone, Copy)]
struct PerfEventAttr {
    kind: u32,
    size: u32,
    config: u64,
    sample_period: u64,
    sample_type: u64,
    read_format: u64,
    flags: u64,
    wakeup_events: u32,
    bp_type: u32,
    config1: u64,
}

const PERF_ATTR_SIZE_VER0: u32 = 64;
const PERF_FORMAT_GROUP: u64 = 1 << 3;

// BITFIELD POSITIONS IN perf_event_attr.flags
const ATTR_DISABLED: u64 = 1 << 0;
const ATTR_EXCLUDE_KERNEL: u64 = 1 << 5;
const ATTR_EXCLUDE_HV: u64 = 1 << 6;

const PERF_FLAG_FD_CLOEXEC: libc::c_ulong = 1 << 3;

// _IO('$', n)
const PERF_EVENT_IOC_ENABLE: libc::c_ulong = 0x2400;
const PERF_EVENT_IOC_RESET: libc::c_ulong = 0x2403;
const PERF_IOC_FLAG_GROUP: libc::c_int = 1;

const PARANOID_PATH: &str = "/proc/sys/kernel/perf_event_paranoid";

struct PerfGroup {
    fds: Vec<RawFd>,
    running: bool,
}

#[derive(Default)]
pub struct PerfBackend {
    groups: Vec<PerfGroup>,
}

impl PerfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // NONE WHEN THE KERNEL HAS NO PERF SUPPORT (OR /proc IS NOT MOUNTED)
    pub fn paranoid_level() -> Option<i32> {
        std::fs::read_to_string(PARANOID_PATH)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    fn group(&self, group: GroupHandle) -> Result<&PerfGroup, CounterError> {
        self.groups.get(group).ok_or(CounterError::NoGroup(group))
    }

    fn leader(&self, group: GroupHandle) -> Result<RawFd, CounterError> {
        self.group(group)?
            .fds
            .first()
            .copied()
            .ok_or(CounterError::EmptyGroup(group))
    }

    fn open(code: EventCode, group_fd: RawFd) -> io::Result<RawFd> {
        // LEADER STARTS DISABLED; MEMBERS FOLLOW THE LEADER
        let mut flags = ATTR_EXCLUDE_KERNEL | ATTR_EXCLUDE_HV;
        if group_fd < 0 {
            flags |= ATTR_DISABLED;
        }
        let attr = PerfEventAttr {
            kind: code.kind,
            size: PERF_ATTR_SIZE_VER0,
            config: code.config,
            read_format: PERF_FORMAT_GROUP,
            flags,
            ..PerfEventAttr::default()
        };

        // pid=0, cpu=-1: THIS THREAD, ANY CPU
        let fd = unsafe {
            libc::syscall(
                libc::SYS_perf_event_open,
                &attr as *const PerfEventAttr,
                0 as libc::pid_t,
                -1 as libc::c_int,
                group_fd as libc::c_int,
                PERF_FLAG_FD_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(fd as RawFd)
    }

    fn ioctl_group(fd: RawFd, request: libc::c_ulong, op: &'static str) -> Result<(), CounterError> {
        let rc = unsafe { libc::ioctl(fd, request as _, PERF_IOC_FLAG_GROUP) };
        if rc < 0 {
            return Err(CounterError::Io { op, source: io::Error::last_os_error() });
        }
        Ok(())
    }
}

impl CounterBackend for PerfBackend {
    fn init(&mut self) -> Result<(), CounterError> {
        match Self::paranoid_level() {
            Some(_) => Ok(()),
            None => Err(CounterError::Unsupported(format!("{} missing", PARANOID_PATH))),
        }
    }

    // perf COUNTERS OPENED WITH pid=0 ARE ALREADY PER-THREAD
    fn register_thread(&mut self) -> Result<(), CounterError> {
        Ok(())
    }

    fn create_group(&mut self) -> Result<GroupHandle, CounterError> {
        self.groups.push(PerfGroup { fds: Vec::new(), running: false });
        Ok(self.groups.len() - 1)
    }

    fn add_event(&mut self, group: GroupHandle, name: &str) -> Result<(), CounterError> {
        let code = resolve_event(name).ok_or_else(|| CounterError::UnknownEvent(name.to_string()))?;
        let group_fd = self.group(group)?.fds.first().copied().unwrap_or(-1);
        let fd = Self::open(code, group_fd).map_err(|source| CounterError::Open {
            name: name.to_string(),
            source,
        })?;
        self.groups[group].fds.push(fd);
        Ok(())
    }

    fn start(&mut self, group: GroupHandle) -> Result<(), CounterError> {
        let leader = self.leader(group)?;
        Self::ioctl_group(leader, PERF_EVENT_IOC_ENABLE, "PERF_EVENT_IOC_ENABLE")?;
        self.groups[group].running = true;
        Ok(())
    }

    fn state(&self, group: GroupHandle) -> Result<CounterState, CounterError> {
        Ok(if self.group(group)?.running {
            CounterState::Running
        } else {
            CounterState::Stopped
        })
    }

    fn read(&mut self, group: GroupHandle) -> Result<Vec<i64>, CounterError> {
        let leader = self.leader(group)?;
        let n = self.groups[group].fds.len();

        // PERF_FORMAT_GROUP LAYOUT: u64 nr, THEN nr x u64 VALUE
        let mut buf = vec![0u64; 1 + n];
        let want = buf.len() * std::mem::size_of::<u64>();
        let got = unsafe { libc::read(leader, buf.as_mut_ptr() as *mut libc::c_void, want) };
        if got < 0 {
            return Err(CounterError::Io { op: "read", source: io::Error::last_os_error() });
        }
        if (got as usize) < std::mem::size_of::<u64>() {
            return Err(CounterError::Io {
                op: "read",
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "short perf group read"),
            });
        }

        let nr = (buf[0] as usize).min(n);
        Ok(buf[1..1 + nr].iter().map(|&v| v as i64).collect())
    }

    fn reset(&mut self, group: GroupHandle) -> Result<(), CounterError> {
        let leader = self.leader(group)?;
        Self::ioctl_group(leader, PERF_EVENT_IOC_RESET, "PERF_EVENT_IOC_RESET")
    }
}

impl Drop for PerfBackend {
    fn drop(&mut self) {
        for g in &self.groups {
            // MEMBERS BEFORE LEADER
            for &fd in g.fds.iter().rev() {
                unsafe {
                    libc::close(fd);
                }
            }
        }
    }
}

// --- ADAPTER ---

pub fn current_thread_id() -> u64 {
    unsafe { libc::pthread_self() as u64 }
}

pub struct CounterSet<B: CounterBackend> {
    backend: B,
    group: Option<GroupHandle>,
    names: Vec<String>,
    active: Vec<bool>,
}

impl<B: CounterBackend> CounterSet<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            group: None,
            names: Vec::new(),
            active: Vec::new(),
        }
    }

    pub fn initialize(&mut self) {
        log_info!("counters: initializing backend");
        if let Err(e) = self.backend.init() {
            log_error!("counters: backend initialization failed: {}", e);
        }
        if let Err(e) = self.backend.register_thread() {
            log_error!("counters: thread registration failed: {}", e);
        }
    }

    // A NAME THAT FAILS TO RESOLVE OR ADD IS LOGGED AND LEFT INACTIVE
    pub fn create_counter_set(&mut self, names: &[String]) {
        self.names = names.to_vec();
        self.active = vec![false; names.len()];

        let group = match self.backend.create_group() {
            Ok(g) => g,
            Err(e) => {
                log_error!("counters: failed to create counter group: {}", e);
                return;
            }
        };
        self.group = Some(group);

        for (i, name) in names.iter().enumerate() {
            match self.backend.add_event(group, name) {
                Ok(()) => {
                    self.active[i] = true;
                    log_info!("counters: added {}", name);
                }
                Err(e) => log_error!("counters: failed to add {}: {}", name, e),
            }
        }
    }

    // NO-OP WHEN ALREADY RUNNING
    pub fn start(&mut self) {
        let Some(group) = self.group else {
            log_warn!("counters: start without a counter group");
            return;
        };
        if matches!(self.backend.state(group), Ok(CounterState::Running)) {
            log_debug!("counters: group already running");
            return;
        }
        match self.backend.start(group) {
            Ok(()) => log_info!("counters: started"),
            Err(e) => log_error!("counters: failed to start: {}", e),
        }
    }

    // CONFIGURED WIDTH. INACTIVE SLOTS AND FAILED READS ARE ZERO.
    pub fn read(&mut self) -> Vec<i64> {
        let mut out = vec![0i64; self.names.len()];
        let Some(group) = self.group else {
            return out;
        };

        let values = match self.backend.read(group) {
            Ok(v) => v,
            Err(e) => {
                log_error!("counters: failed to read: {}", e);
                return out;
            }
        };

        let mut it = values.into_iter();
        for (slot, &on) in out.iter_mut().zip(self.active.iter()) {
            if on {
                *slot = it.next().unwrap_or(0);
            }
        }
        out
    }

    pub fn reset(&mut self) {
        let Some(group) = self.group else {
            return;
        };
        if let Err(e) = self.backend.reset(group) {
            log_error!("counters: failed to reset: {}", e);
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn active(&self) -> &[bool] {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&on| on).count()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
