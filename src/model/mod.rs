pub mod iteration;
pub mod link;
pub mod tenant;
pub mod work_item;
