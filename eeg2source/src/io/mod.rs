//! Recording input, quality screening, and result output.
//!
//! Everything that touches the filesystem on behalf of a job lives here:
//! the `.set`/`.fdt` pair reader, batch input discovery, the quality
//! scans, the NPY writer for region time-courses, and synthetic data
//! generation for trials and tests.

pub mod npy;
pub mod quality;
pub mod reader;
pub mod scan;
pub mod synth;
pub mod tensor;
pub mod validate;
pub mod writer;

pub use quality::{ChannelScan, QualityReport};
pub use reader::{companion_path, FdtPairReader, ReadError, Recording, RecordingMeta, RecordingReader};
pub use scan::discover_inputs;
pub use tensor::{EpochTensor, RegionTimeSeries, TensorShapeError};
pub use validate::{validate_file, ValidationOutcome, ValidationReport};
pub use writer::{output_paths, OutputPaths, ResultMetadata, ResultWriter, WriteError};
