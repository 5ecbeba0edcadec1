//! End-to-end runs: parameters → keys → encode → evaluate → verify.

use crate::codec::TensorCodec;
use crate::context::CkksContext;
use crate::error::Result;
use crate::linalg::{LinearAlgebra, CONV_DEPTH, MATMUL_DEPTH};
use crate::params::CkksParameters;
use crate::polyeval::{PolynomialApproximation, PolynomialEvaluator};
use crate::reference;
use crate::scheme::Ckks;
use crate::tensor::{Kernel, PlaintextTensor};
use crate::verify::{ToleranceReport, VerificationHarness};
use itertools::iproduct;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pass/fail thresholds on the absolute error, per kind of computation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// Threshold for matrix products.
    pub matmul: f64,
    /// Threshold for convolution outputs.
    pub convolution: f64,
    /// Threshold for every activation surrogate.
    pub polynomial: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            matmul: 1e-6,
            convolution: 1e-4,
            polynomial: 1e-3,
        }
    }
}

impl Tolerances {
    /// The same threshold for every computation.
    pub fn uniform(tolerance: f64) -> Self {
        Self {
            matmul: tolerance,
            convolution: tolerance,
            polynomial: tolerance,
        }
    }
}

/// One evaluation program with its plaintext inputs.
#[derive(Clone, Debug)]
pub enum Workload {
    /// `a · b`
    MatMul {
        /// Left operand.
        a: PlaintextTensor,
        /// Right operand.
        b: PlaintextTensor,
    },
    /// Valid, stride-1 convolution.
    Convolution {
        /// Encrypted input.
        input: PlaintextTensor,
        /// Plaintext weights.
        kernel: Kernel,
    },
    /// Convolution followed by each activation surrogate.
    Activation {
        /// Encrypted input.
        input: PlaintextTensor,
        /// Plaintext weights.
        kernel: Kernel,
        /// Surrogates applied to the convolution output, each on its own.
        functions: Vec<PolynomialApproximation>,
    },
}

impl Workload {
    /// [[1,2],[3,4]] · [[5,6],[7,8]] = [[19,22],[43,50]]
    pub fn matmul_example() -> Result<Self> {
        Ok(Self::MatMul {
            a: PlaintextTensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]])?,
            b: PlaintextTensor::from_rows(&[[5.0, 6.0], [7.0, 8.0]])?,
        })
    }

    /// 3x3 ramp convolved with [[1,0],[0,1]] = [[6,8],[12,14]]
    pub fn convolution_example() -> Result<Self> {
        Ok(Self::Convolution {
            input: ramp()?,
            kernel: Kernel::from_rows(&[[1.0, 0.0], [0.0, 1.0]])?,
        })
    }

    /// The convolution example followed by square and SiLU.
    pub fn activation_example() -> Result<Self> {
        Ok(Self::Activation {
            input: ramp()?,
            kernel: Kernel::from_rows(&[[1.0, 0.0], [0.0, 1.0]])?,
            functions: vec![
                PolynomialApproximation::square(),
                PolynomialApproximation::silu(),
            ],
        })
    }

    /// Short label for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MatMul { .. } => "matmul",
            Self::Convolution { .. } => "conv2d",
            Self::Activation { .. } => "activation",
        }
    }

    /// Deepest multiplication chain of the workload.
    pub fn required_depth(&self) -> usize {
        match self {
            Self::MatMul { .. } => MATMUL_DEPTH,
            Self::Convolution { .. } => CONV_DEPTH,
            Self::Activation { functions, .. } => {
                CONV_DEPTH
                    + functions
                        .iter()
                        .map(PolynomialApproximation::required_depth)
                        .max()
                        .unwrap_or(0)
            }
        }
    }

    /// Largest |value| each level of the encrypted run carries, read off the
    /// plaintext computation.
    ///
    /// Terms and partial sums pass through the same ciphertexts as the
    /// results, so they count as well.
    pub fn level_peaks(&self) -> Result<Vec<(usize, f64)>> {
        Ok(match self {
            Self::MatMul { a, b } => {
                reference::matmul(a, b)?;
                let (x, y) = (a.as_matrix(), b.as_matrix());
                let out = iproduct!(0..a.rows(), 0..b.cols())
                    .map(|(i, j)| running_peak((0..a.cols()).map(|k| x[(i, k)] * y[(k, j)])))
                    .fold(0.0, f64::max);
                vec![(0, peak(a).max(peak(b))), (MATMUL_DEPTH, out)]
            }
            Self::Convolution { input, kernel } => {
                vec![(0, peak(input)), (CONV_DEPTH, conv_peak(input, kernel)?)]
            }
            Self::Activation {
                input,
                kernel,
                functions,
            } => {
                let conv = reference::conv2d(input, kernel)?;
                let mut peaks = vec![(0, peak(input)), (CONV_DEPTH, conv_peak(input, kernel)?)];
                for f in functions {
                    for &x in conv.as_matrix().iter() {
                        peaks.extend(
                            f.level_peaks(x)
                                .into_iter()
                                .map(|(level, m)| (CONV_DEPTH + level, m)),
                        );
                    }
                }
                peaks
            }
        })
    }

    /// Parameters of the stand-alone program for this workload.
    ///
    /// Activation needs depth 5 for the example input: the SiLU output reaches
    /// |y| ≈ 800, more than q0 alone can carry at a 50-bit scale. One more
    /// level is kept spare.
    pub fn default_parameters(&self) -> CkksParameters {
        match self {
            Self::MatMul { .. } => CkksParameters {
                batch_size: 8,
                ..CkksParameters::with_depth(2)
            },
            Self::Convolution { .. } => CkksParameters::with_depth(2),
            Self::Activation { .. } => CkksParameters::with_depth(6),
        }
    }
}

fn ramp() -> Result<PlaintextTensor> {
    PlaintextTensor::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]])
}

fn peak(tensor: &PlaintextTensor) -> f64 {
    tensor.as_matrix().amax()
}

/// Largest |term| or |partial sum| met while adding `terms` left to right.
fn running_peak(terms: impl IntoIterator<Item = f64>) -> f64 {
    terms
        .into_iter()
        .scan(0.0, |sum: &mut f64, t| {
            *sum += t;
            Some(t.abs().max(sum.abs()))
        })
        .fold(0.0, f64::max)
}

fn conv_peak(input: &PlaintextTensor, kernel: &Kernel) -> Result<f64> {
    let out = reference::conv2d(input, kernel)?;
    let (x, k) = (input.as_matrix(), kernel.as_tensor().as_matrix());
    Ok(iproduct!(0..out.rows(), 0..out.cols())
        .map(|(i, j)| {
            running_peak(
                iproduct!(0..kernel.rows(), 0..kernel.cols())
                    .map(|(m, n)| x[(i + m, j + n)] * k[(m, n)]),
            )
        })
        .fold(0.0, f64::max))
}

/// Parameters and thresholds of one pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Scheme parameters.
    pub params: CkksParameters,
    /// Pass/fail thresholds.
    pub tolerances: Tolerances,
}

/// Runs workloads under one configuration. Every run builds its own context
/// and keys.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Pipeline running under `config`.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// One report per verified computation, in evaluation order.
    ///
    /// Fails with [`Error::ParameterInsufficient`](crate::Error::ParameterInsufficient)
    /// before any key is drawn when the chain is too short for the workload,
    /// either in levels or in room for the values it produces.
    pub fn run(&self, workload: &Workload) -> Result<Vec<ToleranceReport>> {
        let context = CkksContext::new(self.config.params.clone())?;
        context.ensure_depth(workload.required_depth())?;
        let planned = workload
            .level_peaks()?
            .into_iter()
            .try_fold(workload.required_depth(), |depth, (level, peak)| {
                context.depth_for(level, peak).map(|d| depth.max(d))
            })?;
        if planned > workload.required_depth() {
            debug!(
                "{}: values need {} levels of headroom",
                workload.name(),
                planned - workload.required_depth()
            );
        }
        context.ensure_depth(planned)?;
        info!(
            "{}: N = {}, depth {} (needs {}), log2(QP) = {:.1}",
            workload.name(),
            context.ring_dim(),
            context.depth(),
            planned,
            context.modulus_bits()
        );

        let (scheme, secret_key) = Ckks::generate_keypair(Arc::new(context));
        let codec = TensorCodec::new(&scheme);
        let engine = LinearAlgebra::new(&scheme);
        let harness = VerificationHarness::new(&scheme, &secret_key);
        let tol = &self.config.tolerances;

        let reports = match workload {
            Workload::MatMul { a, b } => {
                let expected = reference::matmul(a, b)?;
                info!("matmul: encrypting operands");
                let c = engine.matmul(&codec.encode(a)?, &codec.encode(b)?)?;
                vec![harness.verify("matmul", &c, &expected, tol.matmul)?]
            }
            Workload::Convolution { input, kernel } => {
                let expected = reference::conv2d(input, kernel)?;
                info!("conv2d: encrypting input");
                let y = engine.conv2d(&codec.encode(input)?, kernel)?;
                vec![harness.verify("conv2d", &y, &expected, tol.convolution)?]
            }
            Workload::Activation {
                input,
                kernel,
                functions,
            } => {
                let conv_expected = reference::conv2d(input, kernel)?;
                info!("activation: encrypting input");
                let y = engine.conv2d(&codec.encode(input)?, kernel)?;
                let mut reports =
                    vec![harness.verify("conv2d", &y, &conv_expected, tol.convolution)?];
                let evaluator = PolynomialEvaluator::new(&scheme);
                for f in functions {
                    let z = evaluator.evaluate_tensor(&y, f)?;
                    let expected = reference::polynomial(&conv_expected, f);
                    reports.push(harness.verify(f.name(), &z, &expected, tol.polynomial)?);
                }
                reports
            }
        };
        info!(
            "{}: {}",
            workload.name(),
            if reports.iter().all(ToleranceReport::success) {
                "all positions within tolerance"
            } else {
                "tolerance failures"
            }
        );
        Ok(reports)
    }
}
