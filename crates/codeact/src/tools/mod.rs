//! A set of demo tools the agent's code can call.

mod read_file;
mod weather;
mod web_search;

pub use read_file::ReadTextFileTool;
pub use weather::WeatherTool;
pub use web_search::WebSearchTool;
