pub mod handler;
pub mod scanner;
pub mod walker;

pub use handler::{PathHandler, SegmentMatcher, SubdirectoryHandler, TargetFileHandler, WalkTarget};
pub use scanner::DirectoryScanner;
pub use walker::RepoWalker;
