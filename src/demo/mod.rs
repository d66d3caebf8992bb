//! Small hand-built heaps the command line runs passes over.

use crate::errors::err::ProfileErr;
use crate::heap::kind::Kind;
use crate::heap::layout::{ArgLayout, ArgPattern, StackFrame, Tso, WhyBlocked};
use crate::heap::{Heap, ObjId};
use crate::retainer_set::Retainer;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    Chain,
    Shared,
    Cycle,
    Threads,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 4] = [ScenarioKind::Chain, ScenarioKind::Shared, ScenarioKind::Cycle, ScenarioKind::Threads];

    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::Chain => "chain",
            ScenarioKind::Shared => "shared",
            ScenarioKind::Cycle => "cycle",
            ScenarioKind::Threads => "threads",
        }
    }
}

impl Display for ScenarioKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown scenario `{}`", s))
    }
}

/// a heap plus names for the objects worth printing
pub struct Scenario {
    pub heap: Heap,
    pub labels: Vec<(&'static str, ObjId)>,
}

impl Scenario {
    pub fn build(kind: ScenarioKind) -> Result<Self, ProfileErr> {
        match kind {
            ScenarioKind::Chain => Ok(chain()),
            ScenarioKind::Shared => Ok(shared()),
            ScenarioKind::Cycle => cycle(),
            ScenarioKind::Threads => Ok(threads()),
        }
    }
}

/// R -> A -> B -> {C, D}, with E only reachable through the retainer C
fn chain() -> Scenario {
    let mut heap = Heap::default();
    let e = heap.data(Kind::ArrWords, vec![0xe]);
    let c = heap.thunk(Kind::Thunk1_0, Retainer(3), &[e], None);
    let d = heap.data(Kind::Constr0_1, vec![0xd]);
    let b = heap.fields(Kind::Constr2_0, Retainer::SYSTEM, &[c, d]);
    let a = heap.fields(Kind::Constr1_0, Retainer::SYSTEM, &[b]);
    let r = heap.mut_var(Retainer(1), a);
    heap.pin(r);
    Scenario { heap, labels: vec![("R", r), ("A", a), ("B", b), ("C", c), ("D", d), ("E", e)] }
}

/// two roots holding on to the same X
fn shared() -> Scenario {
    let mut heap = Heap::default();
    let y = heap.data(Kind::ArrWords, vec![]);
    let x = heap.fields(Kind::Constr1_0, Retainer::SYSTEM, &[y]);
    let r1 = heap.mut_var(Retainer(1), x);
    let r2 = heap.mut_var(Retainer(2), x);
    heap.pin(r1);
    heap.pin(r2);
    Scenario { heap, labels: vec![("R1", r1), ("R2", r2), ("X", x), ("Y", y)] }
}

/// A -> B -> C -> A, entered through R
fn cycle() -> Result<Scenario, ProfileErr> {
    let mut heap = Heap::default();
    let a = heap.fields(Kind::Constr1_0, Retainer::SYSTEM, &[ObjId(0)]);
    let b = heap.fields(Kind::Constr1_0, Retainer::SYSTEM, &[a]);
    let c = heap.fields(Kind::Constr1_0, Retainer::SYSTEM, &[b]);
    heap.set_ptr(a, 0, c)?;
    let r = heap.mut_var(Retainer(1), a);
    heap.pin(r);
    Ok(Scenario { heap, labels: vec![("R", r), ("A", a), ("B", b), ("C", c)] })
}

/// a running thread, a thread blocked on an MVar, a weak pointer, a pinned
/// function and a CAF
fn threads() -> Scenario {
    let mut heap = Heap::new(2, 2);

    let z = heap.data(Kind::ArrWords, vec![1, 2, 3]);
    let suspended = heap.thunk(Kind::Thunk1_0, Retainer(3), &[z], None);
    let w = heap.data(Kind::Constr0_1, vec![7]);
    let f = heap.fun(Kind::Fun0_1, &[], None, ArgLayout::Std(ArgPattern::NP));
    let pap = heap.pap(f, vec![42, w.word()]);
    let stack = heap.stack(
        Retainer(2),
        vec![
            StackFrame::update(suspended),
            StackFrame::small(Kind::RetSmall, vec![pap.word(), 9], &[true, false], None),
            StackFrame::small(Kind::StopFrame, vec![], &[], None),
        ],
    );
    let running = heap.tso(Retainer(1), Tso::running(stack));
    heap.add_thread(0, running);

    let (head, tail) = (heap.data(Kind::Constr0_1, vec![]), heap.data(Kind::Constr0_1, vec![]));
    let value = heap.data(Kind::ArrWords, vec![]);
    let mvar = heap.mvar(Retainer(5), head, tail, value);
    let idle_stack = heap.stack(Retainer(4), vec![StackFrame::small(Kind::StopFrame, vec![], &[], None)]);
    let mut blocked = Tso::running(idle_stack);
    blocked.why_blocked = WhyBlocked::OnMVar;
    blocked.block_info = Some(mvar);
    let blocked = heap.tso(Retainer(4), blocked);
    heap.add_thread(1, blocked);

    let key = heap.data(Kind::ArrWords, vec![]);
    let finalizer = heap.fun(Kind::Fun1_0, &[z], None, ArgLayout::Std(ArgPattern::N));
    let weak = heap.weak(Retainer(6), key, value, finalizer);
    heap.add_weak(1, weak);

    let table = heap.fields(Kind::MutArrPtrsFrozenClean, Retainer::SYSTEM, &[w, z]);
    let caf = heap.static_object(Kind::ThunkStatic, &[], Some(table));
    let global = heap.static_object(Kind::FunStatic, &[], Some(caf));
    heap.static_object(Kind::IndStatic, &[caf], None);
    heap.pin(global);
    heap.record_mutable(0, 1, mvar);

    Scenario {
        heap,
        labels: vec![
            ("running", running),
            ("stack", stack),
            ("suspended", suspended),
            ("z", z),
            ("pap", pap),
            ("w", w),
            ("blocked", blocked),
            ("mvar", mvar),
            ("value", value),
            ("weak", weak),
            ("finalizer", finalizer),
            ("caf", caf),
            ("table", table),
        ],
    }
}
