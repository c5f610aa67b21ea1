// PHASEPREDICT COLLECTIVE RUNTIME SEAM
// DISTRIBUTED JOBS PLUG IN A REDUCTION/BARRIER SUBSTRATE HERE.
//
// CALLER CONTRACT: EVERY PARTICIPANT CALLS all_reduce_sum AND barrier FOR THE
// SAME PHASE BOUNDARY, OR EVERYONE STALLS. NO TIMEOUT, NO CANCELLATION.

pub trait Collective {
    fn is_initialized(&self) -> bool;

    // ELEMENT-WISE SUM ACROSS ALL PARTICIPANTS, RESULT WRITTEN BACK IN PLACE
    fn all_reduce_sum(&mut self, values: &mut [i64]);

    fn barrier(&mut self);
}

impl<C: Collective + ?Sized> Collective for Box<C> {
    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn all_reduce_sum(&mut self, values: &mut [i64]) {
        (**self).all_reduce_sum(values)
    }

    fn barrier(&mut self) {
        (**self).barrier()
    }
}

// SINGLE-PROCESS RUN: NEVER INITIALIZED, EVERYTHING STAYS LOCAL
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalCollective;

impl Collective for LocalCollective {
    fn is_initialized(&self) -> bool {
        false
    }

    fn all_reduce_sum(&mut self, _values: &mut [i64]) {}

    fn barrier(&mut self) {}
}

// PHASE BARRIER: ONLY WAITS WHEN A RUNTIME IS ACTUALLY UP
pub fn synchronize<C: Collective + ?Sized>(collective: &mut C) {
    if collective.is_initialized() {
        collective.barrier();
    }
}
