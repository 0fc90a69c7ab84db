pub mod defaults;
pub mod map;
pub mod table;
pub mod view;

pub use map::{PAGE_SELECT, PAGES, Region, Slot, resolve};
pub use table::{DirtyMask, RegisterShadow};
pub use view::KernelView;
