/*!
 * Data Structures
 *
 * Small-string storage for team, thread and error names
 */

mod inline_string;

pub use inline_string::InlineString;
