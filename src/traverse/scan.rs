use crate::errors::err::{ProfileErr, Site};
use crate::heap::kind::Kind;
use crate::heap::layout::{ArgLayout, Bitmap, StackFrame, SMALL_BITMAP_MAX};
use crate::heap::{Heap, ObjId};
use crate::retainer_set::Retainer;
use crate::traverse::stack::{Frame, WorkStack};

/// pushes every child of an object with a heterogeneous layout in one go, each
/// as a fresh frame parented to that object. used for stack records, partial
/// applications and the other objects whose position cannot be saved cheaply.
pub(crate) struct Scanner<'a> {
    pub heap: &'a Heap,
    pub stack: &'a mut WorkStack,
    pub parent: ObjId,
    pub retainer: Retainer,
}

impl<'a> Scanner<'a> {
    pub fn push(&mut self, child: ObjId) -> Result<(), ProfileErr> {
        self.stack.push(Frame::fresh(child, self.parent, self.retainer))
    }

    pub fn push_opt(&mut self, child: Option<ObjId>) -> Result<(), ProfileErr> {
        match child {
            Some(child) => self.push(child),
            None => Ok(()),
        }
    }

    fn push_word(&mut self, word: u64) -> Result<(), ProfileErr> {
        let child = self.heap.obj_at(word)?;
        self.push(child)
    }

    /// pushes the words of `payload` that `bitmap` marks as pointers, looking
    /// at the first `size` of them
    fn bitmap(&mut self, payload: &[u64], bitmap: &Bitmap, size: usize, owner: Kind) -> Result<(), ProfileErr> {
        let oversized = matches!(bitmap, Bitmap::Small { size: inline, .. } if *inline as usize > SMALL_BITMAP_MAX);
        if oversized || payload.len() < size || bitmap.len() < size {
            return Err(ProfileErr::invalid(owner, Site::StackScan));
        }
        for (i, &word) in payload[..size].iter().enumerate() {
            if bitmap.is_pointer(i) {
                self.push_word(word)?;
            }
        }
        Ok(())
    }

    fn first_word(&self, frame: &StackFrame) -> Result<u64, ProfileErr> {
        frame
            .payload
            .first()
            .copied()
            .ok_or_else(|| ProfileErr::invalid(frame.kind, Site::StackScan))
    }

    /// the bitmap a byte-code object carries for its own frames and arguments
    fn bco_bitmap(&self, bco: ObjId) -> Result<&'a Bitmap, ProfileErr> {
        let heap = self.heap;
        let obj = heap.get(bco)?;
        match (obj.kind()?, &obj.fields()?.bco_bitmap) {
            (Kind::Bco, Some(bitmap)) => Ok(bitmap),
            (kind, _) => Err(ProfileErr::invalid(kind, Site::StackScan)),
        }
    }

    /// pushes the pointer arguments of a call to `fun`. `count` is how many
    /// argument words are present, `None` meaning as many as the function takes.
    fn fun_args(&mut self, fun: ObjId, args: &[u64], count: Option<usize>) -> Result<(), ProfileErr> {
        let heap = self.heap;
        let obj = heap.get(fun)?;
        let kind = obj.kind()?;
        let std_bitmap;
        let bitmap = match &obj.fields()?.args {
            Some(ArgLayout::Std(pattern)) => {
                std_bitmap = pattern.bitmap();
                &std_bitmap
            }
            Some(ArgLayout::Gen(bitmap)) => bitmap,
            Some(ArgLayout::Bco) => self.bco_bitmap(fun)?,
            None => return Err(ProfileErr::invalid(kind, Site::StackScan)),
        };
        let size = count.unwrap_or(bitmap.len());
        self.bitmap(args, bitmap, size, kind)
    }

    /// children of a PAP or AP: the function, then the pointer arguments
    /// supplied so far
    pub fn pap(&mut self, fun: ObjId, args: &[u64]) -> Result<(), ProfileErr> {
        self.push(fun)?;
        if self.heap.kind(fun)? == Kind::Pap {
            return Err(ProfileErr::invalid(Kind::Pap, Site::StackScan));
        }
        self.fun_args(fun, args, Some(args.len()))
    }

    /// walks a sequence of stack records, reading each one's layout from its
    /// descriptor. runs as its own sub-walk on the shared stack.
    pub fn frames(&mut self, frames: &[StackFrame]) -> Result<(), ProfileErr> {
        let saved = self.stack.set_boundary();
        for frame in frames {
            self.frame(frame)?;
        }
        self.stack.restore_boundary(saved);
        Ok(())
    }

    fn frame(&mut self, frame: &StackFrame) -> Result<(), ProfileErr> {
        use Kind::*;
        match frame.kind {
            UpdateFrame => {
                let updatee = self.first_word(frame)?;
                self.push_word(updatee)
            }
            UnderflowFrame | StopFrame | CatchFrame | CatchStmFrame | CatchRetryFrame | AtomicallyFrame
            | RetSmall => {
                match &frame.bitmap {
                    Some(bitmap @ Bitmap::Small { .. }) => {
                        self.bitmap(&frame.payload, bitmap, bitmap.len(), frame.kind)?
                    }
                    _ => return Err(ProfileErr::invalid(frame.kind, Site::StackScan)),
                }
                self.push_opt(frame.srt)
            }
            RetBig => {
                match &frame.bitmap {
                    Some(bitmap @ Bitmap::Large(_)) => {
                        self.bitmap(&frame.payload, bitmap, bitmap.len(), frame.kind)?
                    }
                    _ => return Err(ProfileErr::invalid(frame.kind, Site::StackScan)),
                }
                self.push_opt(frame.srt)
            }
            RetBco => {
                let bco = self.heap.obj_at(self.first_word(frame)?)?;
                self.push(bco)?;
                let bitmap = self.bco_bitmap(bco)?;
                self.bitmap(&frame.payload[1..], bitmap, bitmap.len(), frame.kind)
            }
            RetFun => {
                let fun = self.heap.obj_at(self.first_word(frame)?)?;
                self.push(fun)?;
                self.fun_args(fun, &frame.payload[1..], None)?;
                self.push_opt(frame.srt)
            }
            kind => Err(ProfileErr::invalid(kind, Site::StackScan)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::layout::ArgPattern;
    use crate::traverse::stack::Position;

    fn drain(stack: &mut WorkStack) -> Vec<(ObjId, ObjId)> {
        let mut out = vec![];
        while let Some(frame) = stack.pop() {
            match frame.pos {
                Position::Fresh { parent } => out.push((frame.obj, parent)),
                pos => panic!("unexpected {:?}", pos),
            }
        }
        out.reverse();
        out
    }

    #[test]
    fn small_frame_pushes_only_pointer_words() {
        let mut heap = Heap::default();
        let a = heap.data(Kind::ArrWords, vec![]);
        let b = heap.data(Kind::ArrWords, vec![]);
        let srt = heap.data(Kind::ArrWords, vec![]);
        let owner = heap.stack(Retainer(1), vec![]);
        let frames = vec![StackFrame::small(
            Kind::RetSmall,
            vec![a.word(), 12345, b.word()],
            &[true, false, true],
            Some(srt),
        )];

        let mut stack = WorkStack::new(4).unwrap();
        let mut scanner = Scanner { heap: &heap, stack: &mut stack, parent: owner, retainer: Retainer(1) };
        scanner.frames(&frames).unwrap();
        assert_eq!(drain(&mut stack), vec![(a, owner), (b, owner), (srt, owner)]);
    }

    #[test]
    fn big_frame_uses_out_of_line_bitmap() {
        let mut heap = Heap::default();
        let target = heap.data(Kind::ArrWords, vec![]);
        let mut payload = vec![7u64; 70];
        let mut layout = vec![false; 70];
        payload[65] = target.word();
        layout[65] = true;
        let frames = vec![StackFrame::big(payload, &layout, None)];

        let mut stack = WorkStack::new(4).unwrap();
        let mut scanner = Scanner { heap: &heap, stack: &mut stack, parent: target, retainer: Retainer(1) };
        scanner.frames(&frames).unwrap();
        assert_eq!(drain(&mut stack), vec![(target, target)]);
    }

    #[test]
    fn pap_reads_the_function_argument_layout() {
        let mut heap = Heap::default();
        let x = heap.data(Kind::ArrWords, vec![]);
        let y = heap.data(Kind::ArrWords, vec![]);
        let fun = heap.fun(Kind::Fun, &[], None, ArgLayout::Std(ArgPattern::PNP));
        let mut stack = WorkStack::new(4).unwrap();
        let mut scanner = Scanner { heap: &heap, stack: &mut stack, parent: x, retainer: Retainer(1) };
        scanner.pap(fun, &[y.word(), 42]).unwrap();
        assert_eq!(drain(&mut stack), vec![(fun, x), (y, x)]);
    }

    #[test]
    fn ret_bco_uses_the_bco_bitmap() {
        let mut heap = Heap::default();
        let x = heap.data(Kind::ArrWords, vec![]);
        let bco = heap.bco(&[], Bitmap::from_layout(&[false, true]));
        let frames = vec![StackFrame::ret_bco(bco, vec![0, x.word()])];
        let mut stack = WorkStack::new(4).unwrap();
        let mut scanner = Scanner { heap: &heap, stack: &mut stack, parent: x, retainer: Retainer(1) };
        scanner.frames(&frames).unwrap();
        assert_eq!(drain(&mut stack), vec![(bco, x), (x, x)]);
    }

    #[test]
    fn pap_over_a_bco_uses_its_bitmap() {
        let mut heap = Heap::default();
        let x = heap.data(Kind::ArrWords, vec![]);
        let y = heap.data(Kind::ArrWords, vec![]);
        let bco = heap.bco(&[], Bitmap::from_layout(&[true, false, true]));
        let mut stack = WorkStack::new(4).unwrap();
        let mut scanner = Scanner { heap: &heap, stack: &mut stack, parent: x, retainer: Retainer(1) };
        scanner.pap(bco, &[x.word(), 5, y.word()]).unwrap();
        assert_eq!(drain(&mut stack), vec![(bco, x), (x, x), (y, x)]);
    }

    #[test]
    fn bco_layout_on_a_plain_function_is_fatal() {
        let mut heap = Heap::default();
        let x = heap.data(Kind::ArrWords, vec![]);
        let fun = heap.fun(Kind::Fun, &[], None, ArgLayout::Bco);
        let mut stack = WorkStack::new(4).unwrap();
        let mut scanner = Scanner { heap: &heap, stack: &mut stack, parent: x, retainer: Retainer(1) };
        assert_eq!(
            scanner.pap(fun, &[x.word()]),
            Err(ProfileErr::InvalidObject { kind: Kind::Fun, site: Site::StackScan })
        );
    }

    #[test]
    fn oversized_inline_bitmap_is_fatal() {
        let mut heap = Heap::default();
        let x = heap.data(Kind::ArrWords, vec![]);
        let frame = StackFrame {
            kind: Kind::RetSmall,
            bitmap: Some(Bitmap::Small { size: 70, bits: 0 }),
            payload: vec![x.word(); 70],
            srt: None,
        };
        let mut stack = WorkStack::new(4).unwrap();
        let mut scanner = Scanner { heap: &heap, stack: &mut stack, parent: x, retainer: Retainer(1) };
        assert_eq!(
            scanner.frames(&[frame]),
            Err(ProfileErr::InvalidObject { kind: Kind::RetSmall, site: Site::StackScan })
        );
    }

    #[test]
    fn frame_scan_keeps_enclosing_boundary() {
        let mut heap = Heap::default();
        let x = heap.data(Kind::ArrWords, vec![]);
        let mut stack = WorkStack::new(2).unwrap();
        stack.push(Frame::fresh(x, x, Retainer(1))).unwrap();
        let outer = stack.set_boundary();
        let mut scanner = Scanner { heap: &heap, stack: &mut stack, parent: x, retainer: Retainer(1) };
        scanner.frames(&[StackFrame::update(x)]).unwrap();
        assert!(!stack.is_on_boundary());
        stack.pop();
        assert!(stack.is_on_boundary());
        stack.restore_boundary(outer);
    }

    #[test]
    fn non_frame_kind_in_a_stack_is_fatal() {
        let heap = Heap::default();
        let mut stack = WorkStack::new(2).unwrap();
        let bogus = StackFrame { kind: Kind::Constr, bitmap: None, payload: vec![], srt: None };
        let mut scanner = Scanner { heap: &heap, stack: &mut stack, parent: ObjId(0), retainer: Retainer(1) };
        assert_eq!(
            scanner.frames(&[bogus]),
            Err(ProfileErr::InvalidObject { kind: Kind::Constr, site: Site::StackScan })
        );
    }
}
