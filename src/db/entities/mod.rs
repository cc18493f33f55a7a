//! SeaORM entities for the local subscriber store.
//!
//! Every synchronised table carries a nullable `external_id`: the identifier the router
//! assigned to the row's remote counterpart, unique once set.

pub mod payment;
pub mod plan;
pub mod plan_assignment;
pub mod session;
pub mod user;

pub mod prelude {
    pub use super::user::ActiveModel as UserActiveModel;
    pub use super::user::Column as UserColumn;
    pub use super::user::Entity as User;
    pub use super::user::Model as UserModel;

    pub use super::plan::ActiveModel as PlanActiveModel;
    pub use super::plan::Column as PlanColumn;
    pub use super::plan::Entity as Plan;
    pub use super::plan::Model as PlanModel;

    pub use super::plan_assignment::ActiveModel as PlanAssignmentActiveModel;
    pub use super::plan_assignment::Column as PlanAssignmentColumn;
    pub use super::plan_assignment::Entity as PlanAssignment;
    pub use super::plan_assignment::Model as PlanAssignmentModel;

    pub use super::payment::ActiveModel as PaymentActiveModel;
    pub use super::payment::Column as PaymentColumn;
    pub use super::payment::Entity as Payment;
    pub use super::payment::Model as PaymentModel;

    pub use super::session::ActiveModel as SessionActiveModel;
    pub use super::session::Column as SessionColumn;
    pub use super::session::Entity as Session;
    pub use super::session::Model as SessionModel;
}
