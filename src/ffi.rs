// PHASEPREDICT C ABI
// THE HOST PROGRAM (C, C++, FORTRAN) CALLS predict_cluster() ONCE PER PHASE.
//
// ONE PROCESS-WIDE PREDICTOR BEHIND A MUTEX. predict_cluster_ IS THE
// TRAILING-UNDERSCORE NAME FORTRAN COMPILERS MANGLE TO; IT FORWARDS.
//
// DISTRIBUTED HOSTS REGISTER THEIR REDUCTION/BARRIER SUBSTRATE (E.G. PMPI)
// THROUGH phasepredict_register_collective BEFORE THE FIRST PHASE. WITHOUT
// HOOKS THE RUN IS PROCESS-LOCAL.

use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, OnceLock};

use crate::collective::Collective;
use crate::config::PredictorConfig;
use crate::counters::PerfBackend;
use crate::features::NOISE;
use crate::predictor::ClusterPredictor;

// MATCHES struct phasepredict_collective_hooks IN THE HOST HEADER
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CollectiveHooks {
    pub is_initialized: Option<extern "C" fn() -> c_int>,
    // IN-PLACE ELEMENT-WISE SUM. 0 ON SUCCESS.
    pub all_reduce_sum: Option<extern "C" fn(values: *mut i64, len: c_int) -> c_int>,
    pub barrier: Option<extern "C" fn() -> c_int>,
}

static HOOKS: OnceLock<CollectiveHooks> = OnceLock::new();

// COLLECTIVE BACKED BY HOST-REGISTERED CALLBACKS
#[derive(Clone, Copy, Debug, Default)]
pub struct HostCollective;

impl Collective for HostCollective {
    fn is_initialized(&self) -> bool {
        match HOOKS.get().and_then(|h| h.is_initialized) {
            Some(f) => f() != 0,
            None => false,
        }
    }

    fn all_reduce_sum(&mut self, values: &mut [i64]) {
        let Some(f) = HOOKS.get().and_then(|h| h.all_reduce_sum) else {
            return;
        };
        let rc = f(values.as_mut_ptr(), values.len() as c_int);
        if rc != 0 {
            log_error!("collective: all-reduce failed with code {}", rc);
        }
    }

    fn barrier(&mut self) {
        let Some(f) = HOOKS.get().and_then(|h| h.barrier) else {
            return;
        };
        let rc = f();
        if rc != 0 {
            log_error!("collective: barrier failed with code {}", rc);
        }
    }
}

type HostPredictor = ClusterPredictor<PerfBackend, HostCollective>;

static PREDICTOR: Mutex<Option<HostPredictor>> = Mutex::new(None);

// CANONICAL IMPLEMENTATION. EVERY EXPORTED NAME ENDS HERE.
fn predict_cluster_impl() -> c_int {
    let mut guard = PREDICTOR.lock().unwrap_or_else(|e| e.into_inner());
    let predictor = guard.get_or_insert_with(|| {
        crate::init_logging("info");
        ClusterPredictor::new(PredictorConfig::from_env(), PerfBackend::new(), HostCollective)
    });

    match predictor.predict_cluster() {
        Ok(cluster) => cluster,
        Err(e) => {
            // CONFIGURATION FAILURE: THE ONLY FATAL PATH
            log_error!("phasepredict: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[no_mangle]
pub extern "C" fn predict_cluster() -> c_int {
    panic::catch_unwind(AssertUnwindSafe(predict_cluster_impl)).unwrap_or(NOISE)
}

#[no_mangle]
pub extern "C" fn predict_cluster_() -> c_int {
    predict_cluster()
}

// 0: REGISTERED. -1: NULL POINTER. -2: ALREADY REGISTERED.
///
/// # Safety
/// `hooks` must be null or point to a valid `CollectiveHooks`. The callbacks
/// must stay callable for the rest of the process.
#[no_mangle]
pub unsafe extern "C" fn phasepredict_register_collective(hooks: *const CollectiveHooks) -> c_int {
    let Some(hooks) = hooks.as_ref() else {
        return -1;
    };
    match HOOKS.set(*hooks) {
        Ok(()) => 0,
        Err(_) => -2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_hooks_rejected() {
        let rc = unsafe { phasepredict_register_collective(std::ptr::null()) };
        assert_eq!(rc, -1);
    }

    #[test]
    fn host_collective_without_hooks_is_local() {
        // NO TEST IN THIS BINARY REGISTERS HOOKS
        let mut c = HostCollective;
        let mut v = [1i64, 2];
        c.all_reduce_sum(&mut v);
        c.barrier();
        assert!(!c.is_initialized());
        assert_eq!(v, [1, 2]);
    }
}
