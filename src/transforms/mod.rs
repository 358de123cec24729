// Transform module
//
// Derived channels computed incrementally from numeric input channels:
// - Function contract and the single-input driver
// - Registry of named transform constructors
// - Built-in transforms (scale, derivative, moving average, outlier
//   removal, integral, quaternion to roll/pitch/yaw)
// - Pipeline that wires transforms to channels in dependency order

pub mod derivative;
pub mod function;
pub mod integral;
pub mod moving_average;
pub mod outlier;
pub mod pipeline;
pub mod quaternion;
pub mod registry;
pub mod scale;
pub mod types;

pub use derivative::{DerivativeConfig, DerivativeTransform, FirstDerivative};
pub use function::{InputCursor, SampleTransform, Siso, TransformFunction};
pub use integral::{Integral, IntegralConfig, IntegralTransform, IntegrationMethod};
pub use moving_average::{MovingAverage, MovingAverageConfig, MovingAverageTransform};
pub use outlier::{OutlierConfig, OutlierRemoval, OutlierRemovalTransform};
pub use pipeline::{TransformPipeline, TransformSpec};
pub use quaternion::{quaternion_to_euler, EulerAngles, QuaternionConfig, QuaternionToRpy};
pub use registry::{TransformConstructor, TransformFactory};
pub use scale::{Scale, ScaleConfig, ScaleTransform};
pub use types::{TransformError, TransformResult};
