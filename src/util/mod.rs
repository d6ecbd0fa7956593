mod absolute_difference;
mod compact_iterator;
mod dump_to_file;
mod render_graph;

pub use absolute_difference::AbsoluteDifference;
pub use compact_iterator::CompactIterator;
pub use dump_to_file::DumpToFile;
pub use render_graph::RenderGraph;
