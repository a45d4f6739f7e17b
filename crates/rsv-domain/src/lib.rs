#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod index;
pub mod matrix;
pub mod model;
pub mod results;

pub use index::{
    insert_build_results, load_index, package_dir, package_dir_name, render_json,
    save_build_results, write_index, write_json, IndexError, IndexLock, IndexSnapshot,
    IndexWriteSummary, ALIAS_FILE, BUILDS_FILE, METADATA_FILE,
};
pub use matrix::{
    default_matrix_path, load_matrix, parse_matrix, MatrixError, MatrixLayer, TestbedMatrix,
};
pub use model::{
    full_name, latest_timestamp, Alias, BuildKey, BuildResult, Job, MatrixEntry, Package,
    PackageResult, PackageSource, TestbedEntry, TestbedResult, Version, GITHUB_HOST,
};
pub use results::{group_by_repo, load_results_manifest, parse_results_manifest, ResultsById};
