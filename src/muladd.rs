//! Multiply/Add Post-Processing
//!
//! Every node finishes its tick by scaling and offsetting its raw block:
//!
//! ```text
//! out[i] = raw[i] * mul[i] + add[i]
//! ```
//!
//! Both operands may be constants or streams, and a stream operand may be
//! bound "reversed" (divide by the stream instead of multiplying, subtract
//! it instead of adding). That gives nine operand combinations. Rather than
//! testing operand kinds for every sample, [`MulAdd`] compiles the current
//! operands into a [`Kernel`] whenever one of them is rebound, and `process`
//! runs that kernel's loop unconditionally over the whole block.
//!
//! | mul \ add | scalar           | stream            | reversed stream      |
//! |-----------|------------------|-------------------|----------------------|
//! | scalar    | `ScalarScalar`   | `ScalarStream`    | `ScalarRevStream`    |
//! | stream    | `StreamScalar`   | `StreamStream`    | `StreamRevStream`    |
//! | reversed  | `RevStreamScalar`| `RevStreamStream` | `RevStreamRevStream` |
//!
//! Constant divisors and subtrahends are folded at bind time (`div(4)` is
//! stored as `mul(0.25)`, `sub(2)` as `add(-2)`), so scalars never need a
//! reversed kernel.

use crate::node::TickContext;
use crate::server::{GraphError, NodeId};
use crate::signal::{BindError, Binding, SignalSource};

/// Divisor streams are kept at least this far from zero
pub const MIN_DIVISOR: f64 = 1e-5;

#[inline(always)]
fn guard_divisor(d: f64) -> f64 {
    if d < MIN_DIVISOR && d > -MIN_DIVISOR {
        MIN_DIVISOR
    } else {
        d
    }
}

/// The multiplicative operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Factor {
    Scalar(f64),
    Stream(NodeId),
    /// Divide by the stream
    InverseStream(NodeId),
}

impl Factor {
    fn node(&self) -> Option<NodeId> {
        match self {
            Factor::Scalar(_) => None,
            Factor::Stream(id) | Factor::InverseStream(id) => Some(*id),
        }
    }
}

/// The additive operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Term {
    Scalar(f64),
    Stream(NodeId),
    /// Subtract the stream
    NegatedStream(NodeId),
}

impl Term {
    fn node(&self) -> Option<NodeId> {
        match self {
            Term::Scalar(_) => None,
            Term::Stream(id) | Term::NegatedStream(id) => Some(*id),
        }
    }
}

/// A precompiled multiply/add loop with its operands captured
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    ScalarScalar { mul: f64, add: f64 },
    StreamScalar { mul: NodeId, add: f64 },
    RevStreamScalar { div: NodeId, add: f64 },
    ScalarStream { mul: f64, add: NodeId },
    StreamStream { mul: NodeId, add: NodeId },
    RevStreamStream { div: NodeId, add: NodeId },
    ScalarRevStream { mul: f64, sub: NodeId },
    StreamRevStream { mul: NodeId, sub: NodeId },
    RevStreamRevStream { div: NodeId, sub: NodeId },
}

impl Kernel {
    /// Pick the kernel for an operand pair
    pub fn select(mul: Factor, add: Term) -> Self {
        match (mul, add) {
            (Factor::Scalar(mul), Term::Scalar(add)) => Kernel::ScalarScalar { mul, add },
            (Factor::Stream(mul), Term::Scalar(add)) => Kernel::StreamScalar { mul, add },
            (Factor::InverseStream(div), Term::Scalar(add)) => Kernel::RevStreamScalar { div, add },
            (Factor::Scalar(mul), Term::Stream(add)) => Kernel::ScalarStream { mul, add },
            (Factor::Stream(mul), Term::Stream(add)) => Kernel::StreamStream { mul, add },
            (Factor::InverseStream(div), Term::Stream(add)) => Kernel::RevStreamStream { div, add },
            (Factor::Scalar(mul), Term::NegatedStream(sub)) => Kernel::ScalarRevStream { mul, sub },
            (Factor::Stream(mul), Term::NegatedStream(sub)) => Kernel::StreamRevStream { mul, sub },
            (Factor::InverseStream(div), Term::NegatedStream(sub)) => {
                Kernel::RevStreamRevStream { div, sub }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kernel::ScalarScalar { .. } => "scalar*scalar",
            Kernel::StreamScalar { .. } => "stream*scalar",
            Kernel::RevStreamScalar { .. } => "revstream*scalar",
            Kernel::ScalarStream { .. } => "scalar*stream",
            Kernel::StreamStream { .. } => "stream*stream",
            Kernel::RevStreamStream { .. } => "revstream*stream",
            Kernel::ScalarRevStream { .. } => "scalar*revstream",
            Kernel::StreamRevStream { .. } => "stream*revstream",
            Kernel::RevStreamRevStream { .. } => "revstream*revstream",
        }
    }

    /// Run the kernel in place over `data`
    pub fn run(&self, ctx: &TickContext<'_>, data: &mut [f64]) -> Result<(), GraphError> {
        match *self {
            Kernel::ScalarScalar { mul, add } => {
                if mul == 1.0 && add == 0.0 {
                    return Ok(());
                }
                for x in data.iter_mut() {
                    *x = *x * mul + add;
                }
            }
            Kernel::StreamScalar { mul, add } => {
                let mul = ctx.block(mul)?;
                for (x, &m) in data.iter_mut().zip(mul) {
                    *x = *x * m + add;
                }
            }
            Kernel::RevStreamScalar { div, add } => {
                let div = ctx.block(div)?;
                for (x, &d) in data.iter_mut().zip(div) {
                    *x = *x / guard_divisor(d) + add;
                }
            }
            Kernel::ScalarStream { mul, add } => {
                let add = ctx.block(add)?;
                for (x, &a) in data.iter_mut().zip(add) {
                    *x = *x * mul + a;
                }
            }
            Kernel::StreamStream { mul, add } => {
                let mul = ctx.block(mul)?;
                let add = ctx.block(add)?;
                for ((x, &m), &a) in data.iter_mut().zip(mul).zip(add) {
                    *x = *x * m + a;
                }
            }
            Kernel::RevStreamStream { div, add } => {
                let div = ctx.block(div)?;
                let add = ctx.block(add)?;
                for ((x, &d), &a) in data.iter_mut().zip(div).zip(add) {
                    *x = *x / guard_divisor(d) + a;
                }
            }
            Kernel::ScalarRevStream { mul, sub } => {
                let sub = ctx.block(sub)?;
                for (x, &s) in data.iter_mut().zip(sub) {
                    *x = *x * mul - s;
                }
            }
            Kernel::StreamRevStream { mul, sub } => {
                let mul = ctx.block(mul)?;
                let sub = ctx.block(sub)?;
                for ((x, &m), &s) in data.iter_mut().zip(mul).zip(sub) {
                    *x = *x * m - s;
                }
            }
            Kernel::RevStreamRevStream { div, sub } => {
                let div = ctx.block(div)?;
                let sub = ctx.block(sub)?;
                for ((x, &d), &s) in data.iter_mut().zip(div).zip(sub) {
                    *x = *x / guard_divisor(d) - s;
                }
            }
        }
        Ok(())
    }
}

/// Post-processing stage shared by every node in the family
#[derive(Debug, Clone)]
pub struct MulAdd {
    mul: Factor,
    add: Term,
    kernel: Kernel,
}

impl MulAdd {
    /// Names of the inputs handled by [`MulAdd::set_input`]
    pub const INPUTS: [&'static str; 4] = ["mul", "add", "sub", "div"];

    /// Identity stage: `mul = 1`, `add = 0`
    pub fn new() -> Self {
        let mul = Factor::Scalar(1.0);
        let add = Term::Scalar(0.0);
        Self {
            mul,
            add,
            kernel: Kernel::select(mul, add),
        }
    }

    pub fn mul(&self) -> Factor {
        self.mul
    }

    pub fn add(&self) -> Term {
        self.add
    }

    /// The kernel selected for the current operands
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    fn reselect(&mut self) {
        self.kernel = Kernel::select(self.mul, self.add);
    }

    /// Multiply by a constant or a stream
    pub fn set_mul(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.mul = match binding.into().into_signal("mul")? {
            SignalSource::Scalar(v) => Factor::Scalar(v),
            SignalSource::Stream(id) => Factor::Stream(id),
        };
        self.reselect();
        Ok(())
    }

    /// Divide by a constant or a stream
    pub fn set_div(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.mul = match binding.into().into_signal("div")? {
            // Subnormal divisors overflow the reciprocal as surely as zero
            SignalSource::Scalar(v) => match 1.0 / v {
                inv if inv.is_finite() => Factor::Scalar(inv),
                _ => return Err(BindError::DivisionByZero),
            },
            SignalSource::Stream(id) => Factor::InverseStream(id),
        };
        self.reselect();
        Ok(())
    }

    /// Add a constant or a stream
    pub fn set_add(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.add = match binding.into().into_signal("add")? {
            SignalSource::Scalar(v) => Term::Scalar(v),
            SignalSource::Stream(id) => Term::Stream(id),
        };
        self.reselect();
        Ok(())
    }

    /// Subtract a constant or a stream
    pub fn set_sub(&mut self, binding: impl Into<Binding>) -> Result<(), BindError> {
        self.add = match binding.into().into_signal("sub")? {
            SignalSource::Scalar(v) => Term::Scalar(-v),
            SignalSource::Stream(id) => Term::NegatedStream(id),
        };
        self.reselect();
        Ok(())
    }

    /// Route a named rebind to the matching setter
    pub fn set_input(&mut self, name: &str, binding: Binding) -> Result<(), BindError> {
        match name {
            "mul" => self.set_mul(binding),
            "add" => self.set_add(binding),
            "sub" => self.set_sub(binding),
            "div" => self.set_div(binding),
            other => Err(BindError::UnknownInput(other.to_string())),
        }
    }

    /// Upstream nodes read by the current kernel
    pub fn upstream(&self) -> impl Iterator<Item = NodeId> {
        self.mul.node().into_iter().chain(self.add.node())
    }

    #[inline]
    pub fn process(&self, ctx: &TickContext<'_>, data: &mut [f64]) -> Result<(), GraphError> {
        self.kernel.run(ctx, data)
    }
}

impl Default for MulAdd {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use slotmap::{SecondaryMap, SlotMap};

    struct Fixture {
        blocks: SecondaryMap<NodeId, Block>,
        a: NodeId,
        b: NodeId,
    }

    /// Two upstream blocks: `a = [1, 2, 4, -4]`, `b = [10, 20, 30, 40]`
    fn fixture() -> Fixture {
        let mut ids: SlotMap<NodeId, ()> = SlotMap::new();
        let a = ids.insert(());
        let b = ids.insert(());
        let mut blocks = SecondaryMap::new();
        blocks.insert(a, Block::from_samples(vec![1.0, 2.0, 4.0, -4.0]));
        blocks.insert(b, Block::from_samples(vec![10.0, 20.0, 30.0, 40.0]));
        Fixture { blocks, a, b }
    }

    fn run(stage: &MulAdd, fx: &Fixture) -> Vec<f64> {
        let ctx = TickContext::new(&fx.blocks, 4, 44100.0);
        let mut data = vec![2.0; 4];
        stage.process(&ctx, &mut data).unwrap();
        data
    }

    #[test]
    fn test_default_is_identity() {
        let fx = fixture();
        let stage = MulAdd::new();
        assert!(matches!(stage.kernel(), Kernel::ScalarScalar { mul, add } if mul == 1.0 && add == 0.0));
        assert_eq!(run(&stage, &fx), vec![2.0; 4]);
        assert_eq!(stage.upstream().count(), 0);
    }

    #[test]
    fn test_all_nine_kernels() {
        let fx = fixture();
        let (a, b) = (fx.a, fx.b);
        let raw = 2.0;
        let av = [1.0, 2.0, 4.0, -4.0];
        let bv = [10.0, 20.0, 30.0, 40.0];

        type Setup = fn(&mut MulAdd, NodeId, NodeId);
        let cases: [(Setup, &str, fn(usize, &[f64; 4], &[f64; 4], f64) -> f64); 9] = [
            (
                |s, _, _| {
                    s.set_mul(3.0).unwrap();
                    s.set_add(1.0).unwrap();
                },
                "scalar*scalar",
                |_, _, _, r| r * 3.0 + 1.0,
            ),
            (
                |s, a, _| {
                    s.set_mul(a).unwrap();
                    s.set_add(1.0).unwrap();
                },
                "stream*scalar",
                |i, a, _, r| r * a[i] + 1.0,
            ),
            (
                |s, a, _| {
                    s.set_div(a).unwrap();
                    s.set_add(1.0).unwrap();
                },
                "revstream*scalar",
                |i, a, _, r| r / a[i] + 1.0,
            ),
            (
                |s, _, b| {
                    s.set_mul(3.0).unwrap();
                    s.set_add(b).unwrap();
                },
                "scalar*stream",
                |i, _, b, r| r * 3.0 + b[i],
            ),
            (
                |s, a, b| {
                    s.set_mul(a).unwrap();
                    s.set_add(b).unwrap();
                },
                "stream*stream",
                |i, a, b, r| r * a[i] + b[i],
            ),
            (
                |s, a, b| {
                    s.set_div(a).unwrap();
                    s.set_add(b).unwrap();
                },
                "revstream*stream",
                |i, a, b, r| r / a[i] + b[i],
            ),
            (
                |s, _, b| {
                    s.set_mul(3.0).unwrap();
                    s.set_sub(b).unwrap();
                },
                "scalar*revstream",
                |i, _, b, r| r * 3.0 - b[i],
            ),
            (
                |s, a, b| {
                    s.set_mul(a).unwrap();
                    s.set_sub(b).unwrap();
                },
                "stream*revstream",
                |i, a, b, r| r * a[i] - b[i],
            ),
            (
                |s, a, b| {
                    s.set_div(a).unwrap();
                    s.set_sub(b).unwrap();
                },
                "revstream*revstream",
                |i, a, b, r| r / a[i] - b[i],
            ),
        ];

        for (setup, name, expected) in cases {
            let mut stage = MulAdd::new();
            setup(&mut stage, a, b);
            assert_eq!(stage.kernel().name(), name);

            let out = run(&stage, &fx);
            for (i, &value) in out.iter().enumerate() {
                assert_eq!(value, expected(i, &av, &bv, raw), "kernel {} sample {}", name, i);
            }
        }
    }

    #[test]
    fn test_scalar_div_and_sub_are_folded() {
        let fx = fixture();
        let mut stage = MulAdd::new();
        stage.set_div(4.0).unwrap();
        stage.set_sub(2.0).unwrap();

        assert_eq!(stage.mul(), Factor::Scalar(0.25));
        assert_eq!(stage.add(), Term::Scalar(-2.0));
        assert_eq!(stage.kernel().name(), "scalar*scalar");
        assert_eq!(run(&stage, &fx), vec![-1.5; 4]);
    }

    #[test]
    fn test_div_by_constant_zero_rejected() {
        let mut stage = MulAdd::new();
        stage.set_mul(2.0).unwrap();

        assert_eq!(stage.set_div(0.0), Err(BindError::DivisionByZero));
        assert_eq!(stage.mul(), Factor::Scalar(2.0));
    }

    #[test]
    fn test_div_by_subnormal_constant_rejected() {
        let mut stage = MulAdd::new();
        stage.set_mul(2.0).unwrap();

        assert_eq!(stage.set_div(1e-310), Err(BindError::DivisionByZero));
        assert_eq!(stage.set_div(-1e-310), Err(BindError::DivisionByZero));
        assert_eq!(stage.mul(), Factor::Scalar(2.0));

        stage.set_div(1e-300).unwrap();
        assert_eq!(stage.mul(), Factor::Scalar(1.0 / 1e-300));
    }

    #[test]
    fn test_divisor_stream_near_zero_is_guarded() {
        let mut ids: SlotMap<NodeId, ()> = SlotMap::new();
        let z = ids.insert(());
        let mut blocks = SecondaryMap::new();
        blocks.insert(z, Block::from_samples(vec![0.0, 1e-7, -1e-7, 0.5]));
        let ctx = TickContext::new(&blocks, 4, 44100.0);

        let mut stage = MulAdd::new();
        stage.set_div(z).unwrap();
        let mut data = vec![1.0; 4];
        stage.process(&ctx, &mut data).unwrap();

        assert_eq!(data, vec![1.0 / MIN_DIVISOR, 1.0 / MIN_DIVISOR, 1.0 / MIN_DIVISOR, 2.0]);
    }

    #[test]
    fn test_rebind_mul_scalar_to_stream_drops_scalar() {
        let fx = fixture();
        let mut stage = MulAdd::new();
        stage.set_mul(5.0).unwrap();
        stage.set_add(fx.b).unwrap();
        assert_eq!(run(&stage, &fx), vec![20.0, 30.0, 40.0, 50.0]);

        stage.set_mul(fx.a).unwrap();
        assert_eq!(run(&stage, &fx), vec![12.0, 24.0, 38.0, 32.0]);
        assert_eq!(stage.upstream().collect::<Vec<_>>(), vec![fx.a, fx.b]);
    }

    #[test]
    fn test_rejected_binding_keeps_kernel() {
        let fx = fixture();
        let mut stage = MulAdd::new();
        stage.set_add(fx.b).unwrap();
        let before = stage.kernel();

        let matrix = crate::matrix::Matrix::new(1, 1).unwrap();
        assert!(stage.set_input("add", Binding::from(matrix)).is_err());
        assert!(stage.set_input("mul", Binding::Scalar(f64::NAN)).is_err());
        assert_eq!(stage.kernel(), before);
    }

    #[test]
    fn test_set_input_routing() {
        let mut stage = MulAdd::new();
        for name in MulAdd::INPUTS {
            assert!(stage.set_input(name, Binding::Scalar(2.0)).is_ok());
        }
        assert_eq!(
            stage.set_input("gain", Binding::Scalar(1.0)),
            Err(BindError::UnknownInput("gain".to_string()))
        );
    }

    #[test]
    fn test_missing_stream_is_unavailable() {
        let fx = fixture();
        let mut ids: SlotMap<NodeId, ()> = SlotMap::new();
        ids.insert(());
        ids.insert(());
        let gone = ids.insert(());

        let mut stage = MulAdd::new();
        stage.set_mul(gone).unwrap();
        let ctx = TickContext::new(&fx.blocks, 4, 44100.0);
        let mut data = vec![1.0; 4];
        assert_eq!(
            stage.process(&ctx, &mut data),
            Err(GraphError::Unavailable(gone))
        );
    }
}
