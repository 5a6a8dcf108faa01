//! Клиентская библиотека для сервиса жалоб жителей.
//!
//! Состоит из слоёв, каждый из которых опирается на предыдущий:
//! - [`TokenStore`]: хранение access/refresh токенов и профиля;
//! - [`AuthClient`]: вход, регистрация, обновление токена на 401 и единая
//!   точка для авторизованных запросов (`reqwest`);
//! - [`ComplaintClient`]: типизированные операции с жалобами;
//! - [`Session`]: текущий пользователь и проверка ролей;
//! - [`ComplaintListView`]: поиск и сводки по загруженному списку.
#![warn(missing_docs)]

mod auth_client;
mod claims;
mod complaint_client;
mod error;
mod models;
mod session;
mod token_store;
mod view_model;

pub use auth_client::{AuthClient, ClientConfig, DEFAULT_BASE_URL, RequestOptions};
pub use claims::{AccessClaims, decode_access_claims};
pub use complaint_client::ComplaintClient;
pub use error::{ClientError, ClientResult};
pub use models::{
    Complaint, ComplaintFilter, ComplaintStat, ComplaintStatus, Credentials, RegisteredUser,
    RegistrationData, Role, TokenPair, UserProfile,
};
pub use session::{Access, CITIZEN_ONLY, STAFF_ONLY, Session, SessionState};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use view_model::{
    ComplaintListView, StatShare, StatsSummary, filter_complaints, format_relative,
};
