//! Planning Center Services adapter providing people, service types, plans and team members.

mod json_api;
mod planning_center_client;

pub use planning_center_client::{
    PlanningCenterClient, PlanningCenterConfig, DEFAULT_PLANNING_CENTER_API_BASE,
};
