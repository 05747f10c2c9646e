pub mod hashmap;
pub mod prio_queue;
pub mod string_list;

pub use hashmap::GitHashMapExt;
pub use prio_queue::PriorityQueue;
pub use string_list::{StringList, StringListItem};
