use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use complaint_client::{
    Access, AuthClient, CITIZEN_ONLY, ClientError, Complaint, ComplaintClient, ComplaintFilter,
    ComplaintListView, ComplaintStatus, Credentials, FileTokenStore, RegistrationData, Role,
    STAFF_ONLY, Session, StatsSummary, UserProfile, format_relative,
};
use tracing::warn;

mod logging;
mod settings;

use logging::init_logging;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "complaint-cli", version, about = "CLI клиент сервиса жалоб жителей")]
struct Cli {
    /// Адрес сервера (переопределяет COMPLAINTS_API_URL).
    #[arg(long, global = true)]
    server: Option<String>,

    /// Печатать результат в JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Регистрация жителя. Вход выполняется отдельно.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Вход пользователя.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Выход: удаляет сохранённые токены и профиль.
    Logout,
    /// Текущий пользователь.
    Whoami,
    /// Подать жалобу (только для жителей).
    Submit {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
    },
    /// Мои жалобы (только для жителей).
    Mine {
        /// Поиск по заголовку, описанию и автору.
        #[arg(long)]
        search: Option<String>,
    },
    /// Все жалобы (для сотрудников и администраторов).
    All {
        #[arg(long, value_parser = parse_status)]
        status: Option<ComplaintStatus>,
        /// Логин автора жалобы.
        #[arg(long)]
        citizen: Option<String>,
        /// Поиск по заголовку, описанию и автору.
        #[arg(long)]
        search: Option<String>,
    },
    /// Сменить статус жалобы (для сотрудников и администраторов).
    UpdateStatus {
        #[arg(long)]
        id: i64,
        #[arg(long, value_parser = parse_status)]
        status: ComplaintStatus,
    },
    /// Сводка по статусам (для сотрудников и администраторов).
    Stats,
    /// Последние жалобы (для сотрудников и администраторов).
    Recent {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Ошибка: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::from_env()?;
    if let Some(server) = cli.server {
        settings.api_url = normalize_server(server);
    }
    init_logging(&settings.log_level)?;

    let store = Arc::new(FileTokenStore::new(settings.state_dir.clone()));
    let auth = AuthClient::new(settings.client_config(), store)
        .context("не удалось создать HTTP клиент")?;
    let complaints = ComplaintClient::new(auth.clone());
    let mut session = Session::bootstrap(auth);

    let app = App {
        session: &mut session,
        complaints: &complaints,
        json: cli.json,
    };
    app.execute(cli.command).await
}

struct App<'a> {
    session: &'a mut Session,
    complaints: &'a ComplaintClient,
    json: bool,
}

impl App<'_> {
    async fn execute(mut self, command: Command) -> Result<()> {
        match command {
            Command::Register {
                username,
                email,
                password,
            } => {
                let user = self
                    .session
                    .register(RegistrationData::new(username, email, password))
                    .await
                    .map_err(map_client_error)?;
                if self.json {
                    return print_json(&user);
                }
                println!("Регистрация успешна: {} ({})", user.username, user.email);
                println!("Теперь выполните `complaint-cli login ...`");
            }
            Command::Login { username, password } => {
                let user = self
                    .session
                    .login(Credentials::new(username, password))
                    .await
                    .map_err(map_client_error)?;
                if self.json {
                    return print_json(&user);
                }
                print_profile("Вход выполнен", &user);
            }
            Command::Logout => {
                self.session
                    .logout()
                    .map_err(map_client_error)
                    .context("не удалось удалить сохранённую сессию")?;
                println!("Выход выполнен");
            }
            Command::Whoami => match self.session.current_user() {
                Some(user) if self.json => return print_json(&user),
                Some(user) => print_profile("Текущий пользователь", &user),
                None => println!("Вход не выполнен"),
            },
            Command::Submit { title, description } => {
                self.require(CITIZEN_ONLY)?;
                let result = self.complaints.create(&title, &description).await;
                let complaint = self.end_session_on_auth_error(result)?;
                if self.json {
                    return print_json(&complaint);
                }
                print_complaint("Жалоба подана", &complaint);
            }
            Command::Mine { search } => {
                self.require(CITIZEN_ONLY)?;
                let result = self.complaints.list_mine().await;
                let view = ComplaintListView::new(self.end_session_on_auth_error(result)?);
                self.print_list(&view, search.as_deref(), false)?;
            }
            Command::All {
                status,
                citizen,
                search,
            } => {
                self.require(STAFF_ONLY)?;
                let filter = ComplaintFilter {
                    status,
                    citizen_username: citizen,
                };
                let result = self.complaints.list_all(&filter).await;
                let view = ComplaintListView::new(self.end_session_on_auth_error(result)?);
                self.print_list(&view, search.as_deref(), true)?;
            }
            Command::UpdateStatus { id, status } => {
                self.require(STAFF_ONLY)?;
                let result = self.complaints.update_status(id, status).await;
                let complaint = self.end_session_on_auth_error(result)?;
                if self.json {
                    return print_json(&complaint);
                }
                print_complaint("Статус обновлён", &complaint);
            }
            Command::Stats => {
                self.require(STAFF_ONLY)?;
                let result = self.complaints.stats().await;
                let stats = self.end_session_on_auth_error(result)?;
                if self.json {
                    return print_json(&stats);
                }
                print_stats(&StatsSummary::from_stats(&stats));
            }
            Command::Recent { limit } => {
                self.require(STAFF_ONLY)?;
                let result = self.complaints.list_all(&ComplaintFilter::default()).await;
                let view = ComplaintListView::new(self.end_session_on_auth_error(result)?);
                let recent = view.recent(limit);
                if self.json {
                    return print_json(&recent);
                }
                let now = Utc::now();
                println!("Последние жалобы: {}", recent.len());
                for complaint in recent {
                    println!(
                        "- [{}] {} ({}, {}, {})",
                        complaint.id,
                        complaint.title,
                        complaint.citizen,
                        complaint.status.label(),
                        format_relative(complaint.created_at, now)
                    );
                }
            }
        }

        Ok(())
    }

    fn require(&self, allowed: &[Role]) -> Result<()> {
        match self.session.authorize(allowed) {
            Access::Granted => Ok(()),
            Access::Unauthenticated => bail!(
                "требуется авторизация: выполните `complaint-cli login ...` или `complaint-cli register ...`"
            ),
            Access::Unauthorized => bail!("недостаточно прав для этой команды"),
        }
    }

    /// Ошибка аутентификации в авторизованной команде означает, что
    /// сессия больше недействительна.
    fn end_session_on_auth_error<T>(&mut self, result: Result<T, ClientError>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                if matches!(err, ClientError::Auth(_)) {
                    if let Err(logout_err) = self.session.logout() {
                        warn!(error = %logout_err, "failed to clear session after auth error");
                    }
                }
                Err(map_client_error(err))
            }
        }
    }

    fn print_list(
        &self,
        view: &ComplaintListView,
        search: Option<&str>,
        show_citizen: bool,
    ) -> Result<()> {
        let items = view.filtered(search);
        if self.json {
            return print_json(&items);
        }

        if items.is_empty() {
            if search.is_some_and(|query| !query.is_empty()) {
                println!("Нет жалоб, подходящих под запрос");
            } else {
                println!("Жалоб не найдено");
            }
            return Ok(());
        }

        let kind = if search.is_some_and(|query| !query.is_empty()) {
            "найдено"
        } else {
            "всего"
        };
        println!("Жалоб {kind}: {}", items.len());
        for complaint in items {
            print_row(complaint, show_citizen);
        }
        Ok(())
    }
}

fn parse_status(raw: &str) -> Result<ComplaintStatus, String> {
    raw.parse::<ComplaintStatus>().map_err(|err| err.to_string())
}

fn normalize_server(server: String) -> String {
    if server.starts_with("http://") || server.starts_with("https://") {
        return server;
    }

    format!("http://{server}")
}

fn map_client_error(err: ClientError) -> anyhow::Error {
    let message = match err {
        ClientError::Auth(message) => format!("ошибка авторизации: {message}"),
        ClientError::Complaint(message) => format!("ошибка сервиса жалоб: {message}"),
        ClientError::Network(err) => format!("ошибка сети: {err}"),
        ClientError::Decode(message) => format!("неожиданный ответ сервера: {message}"),
        ClientError::Storage(message) => format!("ошибка хранилища сессии: {message}"),
        ClientError::InvalidRequest(message) => format!("некорректный запрос: {message}"),
    };
    anyhow!(message)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value).context("не удалось сформировать JSON")?;
    println!("{raw}");
    Ok(())
}

fn print_profile(title: &str, user: &UserProfile) {
    println!("{title}");
    println!("  id: {}", user.id);
    println!("  username: {}", user.username);
    if let Some(email) = &user.email {
        println!("  email: {email}");
    }
    println!("  role: {}", user.role);
}

fn print_complaint(title: &str, complaint: &Complaint) {
    println!("{title}");
    println!("id: {}", complaint.id);
    println!("title: {}", complaint.title);
    println!("description: {}", complaint.description);
    println!("status: {}", complaint.status.label());
    println!("citizen: {}", complaint.citizen);
    println!("created_at: {}", complaint.created_at);
    if let Some(updated_at) = complaint.updated_at {
        println!("updated_at: {updated_at}");
    }
}

fn print_row(complaint: &Complaint, show_citizen: bool) {
    let author = if show_citizen {
        format!("{} • ", complaint.citizen)
    } else {
        String::new()
    };
    println!(
        "- [{}] {} [{}] ({}{})",
        complaint.id,
        complaint.title,
        complaint.status.label(),
        author,
        complaint.created_at.format("%Y-%m-%d %H:%M")
    );
}

fn print_stats(summary: &StatsSummary) {
    println!("Всего жалоб: {}", summary.total);
    for share in &summary.shares {
        let label = match share.status.parse::<ComplaintStatus>() {
            Ok(status) => status.label(),
            Err(_) => share.status.as_str(),
        };
        println!("- {label}: {} ({:.1}%)", share.count, share.percentage);
    }
}
