// PHASEPREDICT C ABI TESTS
// HOST-REGISTERED COLLECTIVE CALLBACKS BEHIND HostCollective
//
// OWN TEST BINARY: THE HOOK REGISTRY IS PROCESS-WIDE AND SET ONCE.
// ONE TEST FUNCTION SO NOTHING RACES THE REGISTRATION.

use std::os::raw::c_int;
use std::sync::atomic::{AtomicU32, Ordering};

use phasepredict::aggregate::globalize;
use phasepredict::collective::{self, Collective};
use phasepredict::ffi::{phasepredict_register_collective, CollectiveHooks, HostCollective};

static REDUCTIONS: AtomicU32 = AtomicU32::new(0);
static BARRIERS: AtomicU32 = AtomicU32::new(0);

extern "C" fn host_initialized() -> c_int {
    1
}

// TWO IDENTICAL RANKS: EVERY SUM DOUBLES
extern "C" fn host_all_reduce(values: *mut i64, len: c_int) -> c_int {
    REDUCTIONS.fetch_add(1, Ordering::SeqCst);
    let values = unsafe { std::slice::from_raw_parts_mut(values, len as usize) };
    for v in values.iter_mut() {
        *v *= 2;
    }
    0
}

extern "C" fn host_barrier() -> c_int {
    BARRIERS.fetch_add(1, Ordering::SeqCst);
    0
}

#[test]
fn registered_hooks_drive_host_collective() {
    // NOTHING REGISTERED YET: PROCESS-LOCAL
    let mut c = HostCollective;
    assert!(!c.is_initialized());
    assert_eq!(globalize(&mut c, vec![1, 2, 3]), vec![1, 2, 3]);
    collective::synchronize(&mut c);
    assert_eq!(BARRIERS.load(Ordering::SeqCst), 0);

    assert_eq!(unsafe { phasepredict_register_collective(std::ptr::null()) }, -1);

    let hooks = CollectiveHooks {
        is_initialized: Some(host_initialized),
        all_reduce_sum: Some(host_all_reduce),
        barrier: Some(host_barrier),
    };
    assert_eq!(unsafe { phasepredict_register_collective(&hooks) }, 0);
    assert!(c.is_initialized());

    // IN-PLACE REDUCTION THROUGH THE CALLBACK
    let mut values = [10i64, 20, 30];
    c.all_reduce_sum(&mut values);
    assert_eq!(values, [20, 40, 60]);
    assert_eq!(globalize(&mut c, vec![1, 2, 3]), vec![2, 4, 6]);
    assert_eq!(REDUCTIONS.load(Ordering::SeqCst), 2);

    collective::synchronize(&mut c);
    collective::synchronize(&mut c);
    assert_eq!(BARRIERS.load(Ordering::SeqCst), 2);

    // SECOND REGISTRATION IS REFUSED, THE FIRST STAYS IN PLACE
    let empty = CollectiveHooks {
        is_initialized: None,
        all_reduce_sum: None,
        barrier: None,
    };
    assert_eq!(unsafe { phasepredict_register_collective(&empty) }, -2);
    assert!(c.is_initialized());
}
