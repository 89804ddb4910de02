use serde::{Deserialize, Serialize};

use crate::models::{Pagination, UserProfile};

// -- Auth --

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Returned by every authentication route: a bearer token plus the user.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub jwt: String,
    pub user: UserProfile,
}

/// Partial profile update. Unset fields are left untouched by the backend.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_icon_url: Option<String>,
}

/// The backend wraps write payloads in a `data` envelope.
#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

// -- Responses --

#[derive(Debug, Clone, Deserialize)]
pub struct StrapiResponse<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    pub pagination: Pagination,
}

/// One page of a collection listing.
#[derive(Debug, Clone, Deserialize)]
pub struct StrapiPage<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> StrapiPage<T> {
    pub fn pagination(&self) -> Pagination {
        self.meta.pagination
    }
}

/// Error body returned by the backend on any non-2xx response.
#[derive(Debug, Clone, Deserialize)]
pub struct StrapiErrorBody {
    pub error: StrapiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrapiErrorDetail {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
}

// -- Messages --

/// A user-authored message about to be sent to a character.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub query: String,
    pub message_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateMessageBody {
    pub character_id: String,
    pub query: String,
    pub message_id: String,
}
