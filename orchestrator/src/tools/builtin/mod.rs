//! Built-in tools backing the QuestEngine's exploration/blocking set and
//! the SessionLoop's read/write set.

mod ask_question;
mod bash;
mod cancel_objective;
mod complete_quest;
mod edit_file;
mod get_objective_details;
mod git_commit;
mod git_diff;
mod git_log;
mod git_status;
mod glob;
mod grep;
mod list_files;
mod list_objectives;
mod propose_objective;
mod read_file;
mod web_fetch;
mod web_search;
mod write_file;

pub use ask_question::AskQuestionTool;
pub use bash::BashTool;
pub use cancel_objective::CancelObjectiveTool;
pub use complete_quest::CompleteQuestTool;
pub use edit_file::EditFileTool;
pub use get_objective_details::GetObjectiveDetailsTool;
pub use git_commit::GitCommitTool;
pub use git_diff::GitDiffTool;
pub use git_log::GitLogTool;
pub use git_status::GitStatusTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use list_files::ListFilesTool;
pub use list_objectives::ListObjectivesTool;
pub use propose_objective::ProposeObjectiveTool;
pub use read_file::ReadFileTool;
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;
pub use write_file::WriteFileTool;
