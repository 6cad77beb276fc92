use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateInviteCodeResponse {
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest<'a> {
    pub handle: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub birth_date: &'a str,
    pub invite_code: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountResponse {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSessionResponse {
    pub did: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordResponse {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub rev: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutRecordResponse {
    pub uri: String,
    pub cid: String,
    pub commit: Option<Commit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppPasswordResponse {
    pub name: String,
    pub password: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}
