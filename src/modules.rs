//! Source Nodes
//!
//! Simple members of the node family that generate control signals, most
//! often used to drive the positions of a [`MatrixPointer`](crate::MatrixPointer).
//! They share the same multiply/add stage as every other node.

use crate::muladd::MulAdd;
use crate::node::{Node, TickContext};
use crate::server::{GraphError, NodeId};
use crate::signal::{BindError, Binding, Input, SignalSource};
use libm::floor;

/// Converts a value (constant or stream) into a signal.
pub struct Sig {
    value: SignalSource,
    mul_add: MulAdd,
}

impl Sig {
    pub fn new(value: impl Into<SignalSource>) -> Self {
        Self {
            value: value.into(),
            mul_add: MulAdd::new(),
        }
    }

    pub fn value(&self) -> SignalSource {
        self.value
    }

    pub fn set_value(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.value = binding.into().into_signal("value")?;
        Ok(())
    }

    pub fn mul_add_mut(&mut self) -> &mut MulAdd {
        &mut self.mul_add
    }
}

impl Node for Sig {
    fn compute(&mut self, ctx: &TickContext<'_>, out: &mut [f64]) -> Result<(), GraphError> {
        match ctx.read(&self.value)? {
            Input::Scalar(v) => out.fill(v),
            Input::Stream(block) => out.copy_from_slice(block),
        }
        self.mul_add.process(ctx, out)
    }

    fn upstream(&self) -> Vec<NodeId> {
        self.value
            .node()
            .into_iter()
            .chain(self.mul_add.upstream())
            .collect()
    }

    fn set_input(&mut self, name: &str, binding: Binding) -> Result<(), BindError> {
        match name {
            "value" => self.set_value(binding),
            _ => self.mul_add.set_input(name, binding),
        }
    }

    fn type_id(&self) -> &'static str {
        "sig"
    }
}

#[inline]
fn wrap_unit(x: f64) -> f64 {
    x - floor(x)
}

/// Periodic ramp from 0 to 1.
///
/// `freq` is in Hz and may be negative (descending ramp). `phase` offsets
/// the output in fractions of a period.
pub struct Phasor {
    freq: SignalSource,
    phase: SignalSource,
    pointer: f64,
    sample_rate: f64,
    mul_add: MulAdd,
}

impl Phasor {
    pub fn new(freq: impl Into<SignalSource>) -> Self {
        Self {
            freq: freq.into(),
            phase: SignalSource::Scalar(0.0),
            pointer: 0.0,
            sample_rate: 44100.0,
            mul_add: MulAdd::new(),
        }
    }

    pub fn freq(&self) -> SignalSource {
        self.freq
    }

    pub fn phase(&self) -> SignalSource {
        self.phase
    }

    pub fn set_freq(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.freq = binding.into().into_signal("freq")?;
        Ok(())
    }

    pub fn set_phase(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.phase = binding.into().into_signal("phase")?;
        Ok(())
    }

    pub fn mul_add_mut(&mut self) -> &mut MulAdd {
        &mut self.mul_add
    }

    #[inline(always)]
    fn run<F, P>(&mut self, out: &mut [f64], freq: F, phase: P)
    where
        F: Fn(usize) -> f64,
        P: Fn(usize) -> f64,
    {
        let scale = 1.0 / self.sample_rate;
        for (i, o) in out.iter_mut().enumerate() {
            let offset = phase(i);
            *o = if offset.is_finite() {
                wrap_unit(self.pointer + offset)
            } else {
                self.pointer
            };
            // A non-finite increment would poison the pointer for good; hold instead
            let next = self.pointer + freq(i) * scale;
            if next.is_finite() {
                self.pointer = wrap_unit(next);
            }
        }
    }
}

impl Node for Phasor {
    fn compute(&mut self, ctx: &TickContext<'_>, out: &mut [f64]) -> Result<(), GraphError> {
        match (ctx.read(&self.freq)?, ctx.read(&self.phase)?) {
            (Input::Scalar(f), Input::Scalar(p)) => self.run(out, |_| f, |_| p),
            (Input::Stream(fs), Input::Scalar(p)) => self.run(out, |i| fs[i], |_| p),
            (Input::Scalar(f), Input::Stream(ps)) => self.run(out, |_| f, |i| ps[i]),
            (Input::Stream(fs), Input::Stream(ps)) => self.run(out, |i| fs[i], |i| ps[i]),
        }
        self.mul_add.process(ctx, out)
    }

    fn upstream(&self) -> Vec<NodeId> {
        self.freq
            .node()
            .into_iter()
            .chain(self.phase.node())
            .chain(self.mul_add.upstream())
            .collect()
    }

    fn set_input(&mut self, name: &str, binding: Binding) -> Result<(), BindError> {
        match name {
            "freq" => self.set_freq(binding),
            "phase" => self.set_phase(binding),
            _ => self.mul_add.set_input(name, binding),
        }
    }

    fn reset(&mut self) {
        self.pointer = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn type_id(&self) -> &'static str {
        "phasor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use approx::assert_relative_eq;
    use slotmap::{SecondaryMap, SlotMap};

    #[test]
    fn test_sig_scalar_and_stream() {
        let mut ids: SlotMap<NodeId, ()> = SlotMap::new();
        let a = ids.insert(());
        let mut blocks = SecondaryMap::new();
        blocks.insert(a, Block::from_samples(vec![1.0, 2.0, 3.0]));
        let ctx = TickContext::new(&blocks, 3, 44100.0);

        let mut sig = Sig::new(0.75);
        let mut out = vec![0.0; 3];
        sig.compute(&ctx, &mut out).unwrap();
        assert_eq!(out, vec![0.75; 3]);

        sig.set_input("value", Binding::Node(a)).unwrap();
        sig.set_input("sub", Binding::Scalar(1.0)).unwrap();
        sig.compute(&ctx, &mut out).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 2.0]);
        assert_eq!(sig.upstream(), vec![a]);
    }

    #[test]
    fn test_phasor_ramp() {
        let blocks = SecondaryMap::new();
        let ctx = TickContext::new(&blocks, 4, 4.0);

        let mut phasor = Phasor::new(1.0);
        phasor.set_sample_rate(4.0);
        let mut out = vec![0.0; 4];
        phasor.compute(&ctx, &mut out).unwrap();
        assert_eq!(out, vec![0.0, 0.25, 0.5, 0.75]);

        // Continues across blocks and wraps
        phasor.compute(&ctx, &mut out).unwrap();
        assert_eq!(out, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_phasor_phase_offset_and_reset() {
        let blocks = SecondaryMap::new();
        let ctx = TickContext::new(&blocks, 4, 4.0);

        let mut phasor = Phasor::new(1.0);
        phasor.set_sample_rate(4.0);
        phasor.set_phase(0.5).unwrap();
        let mut out = vec![0.0; 4];
        phasor.compute(&ctx, &mut out).unwrap();
        assert_eq!(out, vec![0.5, 0.75, 0.0, 0.25]);

        phasor.reset();
        phasor.set_phase(0.0).unwrap();
        phasor.compute(&ctx, &mut out).unwrap();
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn test_phasor_negative_frequency() {
        let blocks = SecondaryMap::new();
        let ctx = TickContext::new(&blocks, 4, 4.0);

        let mut phasor = Phasor::new(-1.0);
        phasor.set_sample_rate(4.0);
        let mut out = vec![0.0; 4];
        phasor.compute(&ctx, &mut out).unwrap();
        assert_eq!(out, vec![0.0, 0.75, 0.5, 0.25]);
    }

    #[test]
    fn test_phasor_stream_frequency() {
        let mut ids: SlotMap<NodeId, ()> = SlotMap::new();
        let f = ids.insert(());
        let mut blocks = SecondaryMap::new();
        blocks.insert(f, Block::from_samples(vec![0.0, 1.0, 2.0, 0.0]));
        let ctx = TickContext::new(&blocks, 4, 4.0);

        let mut phasor = Phasor::new(f);
        phasor.set_sample_rate(4.0);
        let mut out = vec![0.0; 4];
        phasor.compute(&ctx, &mut out).unwrap();
        assert_relative_eq!(out[1], 0.0);
        assert_relative_eq!(out[2], 0.25);
        assert_relative_eq!(out[3], 0.75);
        assert_eq!(phasor.upstream(), vec![f]);
    }

    #[test]
    fn test_phasor_holds_through_non_finite_streams() {
        let mut ids: SlotMap<NodeId, ()> = SlotMap::new();
        let f = ids.insert(());
        let p = ids.insert(());
        let mut blocks = SecondaryMap::new();
        blocks.insert(
            f,
            Block::from_samples(vec![1.0, f64::NAN, f64::INFINITY, 1.0]),
        );
        blocks.insert(
            p,
            Block::from_samples(vec![0.0, f64::NAN, f64::NEG_INFINITY, 0.0]),
        );
        let ctx = TickContext::new(&blocks, 4, 4.0);

        let mut phasor = Phasor::new(f);
        phasor.set_sample_rate(4.0);
        let mut out = vec![0.0; 4];
        phasor.compute(&ctx, &mut out).unwrap();
        assert_eq!(out, vec![0.0, 0.25, 0.25, 0.25]);

        // Recovers once the frequency is finite again
        phasor.set_input("phase", Binding::Node(p)).unwrap();
        phasor.compute(&ctx, &mut out).unwrap();
        assert!(out.iter().all(|x| x.is_finite()));
        assert_eq!(out, vec![0.5, 0.75, 0.75, 0.75]);
    }
}
