pub mod availability_zone;
pub mod compute;
pub mod instance_management;
pub mod param_mapping;
pub mod resource_wait;
pub mod spot_request;
