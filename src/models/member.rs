use serde::{Deserialize, Serialize};

use crate::membership::RoleMembership;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub user_id: i64,
    pub planet_id: i64,
    pub role_membership: RoleMembership,
}
