pub mod coordinator;
pub mod page;

pub use coordinator::{
    GatewayFactory, QuestionCoordinator, QuestionDefinition, QuestionError, QuestionLayout,
    WidgetControl,
};
pub use page::{ControlRefused, PageStatus, QuestionAlert};
