pub mod panel;

pub use panel::PanelConfig;
