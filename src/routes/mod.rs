use std::convert::Infallible;
use warp::Filter;
use crate::gateway::Gateway;
pub mod deprecation;
pub mod tasks;

pub fn routes(
  gateway: Gateway,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
  tasks::create_route(gateway.clone())
    .or(tasks::fetch_batch_route(gateway.clone()))
    .or(tasks::fetch_route(gateway.clone()))
    .or(tasks::models_route(gateway.clone()))
    .or(tasks::legacy_submit_route(gateway))
    .recover(tasks::handle_rejection)
}
