use reqwest::{Method, Response};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::auth_client::{AuthClient, RequestOptions, read_json};
use crate::error::{ClientError, ClientResult, read_error_detail};
use crate::models::{
    Complaint, ComplaintFilter, ComplaintStat, ComplaintStatus, validate_new_complaint,
};

const CREATE_PATH: &str = "/api/complaints/create/";
const MY_PATH: &str = "/api/complaints/my/";
const ALL_PATH: &str = "/api/complaints/all/";
const STATS_PATH: &str = "/api/complaints/stats/";

#[derive(Debug, Serialize)]
struct CreateComplaintRequestDto<'a> {
    title: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateStatusRequestDto {
    status: ComplaintStatus,
}

#[derive(Debug, Clone)]
/// Типизированный клиент API жалоб.
///
/// Все запросы идут через [`AuthClient::authenticated_request`], поэтому
/// обновление токена и принудительный выход происходят там.
pub struct ComplaintClient {
    auth: AuthClient,
}

impl ComplaintClient {
    /// Создаёт клиент жалоб поверх клиента аутентификации.
    pub fn new(auth: AuthClient) -> Self {
        Self { auth }
    }

    /// Подаёт новую жалобу от имени текущего пользователя.
    pub async fn create(&self, title: &str, description: &str) -> ClientResult<Complaint> {
        let (title, description) = validate_new_complaint(title, description)?;
        let options = RequestOptions::new(Method::POST).json(&CreateComplaintRequestDto {
            title: &title,
            description: &description,
        })?;

        self.call(CREATE_PATH, &options, "failed to create complaint")
            .await
    }

    /// Жалобы текущего пользователя.
    pub async fn list_mine(&self) -> ClientResult<Vec<Complaint>> {
        self.call(MY_PATH, &RequestOptions::get(), "failed to fetch complaints")
            .await
    }

    /// Все жалобы (для сотрудников). В запрос попадают только заданные
    /// поля фильтра.
    pub async fn list_all(&self, filter: &ComplaintFilter) -> ClientResult<Vec<Complaint>> {
        let options = RequestOptions::get().query(filter.query_pairs());
        self.call(ALL_PATH, &options, "failed to fetch complaints")
            .await
    }

    /// Меняет статус жалобы и возвращает её актуальное состояние с сервера.
    pub async fn update_status(&self, id: i64, status: ComplaintStatus) -> ClientResult<Complaint> {
        let options =
            RequestOptions::new(Method::PATCH).json(&UpdateStatusRequestDto { status })?;
        self.call(
            &format!("/api/complaints/{id}/update/"),
            &options,
            "failed to update complaint",
        )
        .await
    }

    /// Количество жалоб по статусам.
    pub async fn stats(&self) -> ClientResult<Vec<ComplaintStat>> {
        self.call(STATS_PATH, &RequestOptions::get(), "failed to fetch stats")
            .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
        fallback: &str,
    ) -> ClientResult<T> {
        let response = self.auth.authenticated_request(path, options).await?;
        let response = Self::ensure_success(response, fallback).await?;
        read_json(response).await
    }

    async fn ensure_success(response: Response, fallback: &str) -> ClientResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let detail = read_error_detail(response, fallback).await;
        debug!(%status, %detail, "complaint request failed");
        Err(ClientError::Complaint(detail))
    }
}
