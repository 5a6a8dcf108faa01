use chrono::{DateTime, Utc};

use crate::models::{Complaint, ComplaintStat};

/// Отбирает жалобы, у которых заголовок, описание или логин автора
/// содержат `query` без учёта регистра.
///
/// Пустой или отсутствующий запрос возвращает всю коллекцию в исходном
/// порядке.
pub fn filter_complaints<'a>(complaints: &'a [Complaint], query: Option<&str>) -> Vec<&'a Complaint> {
    let query = match query {
        Some(query) if !query.is_empty() => query.to_lowercase(),
        _ => return complaints.iter().collect(),
    };

    complaints
        .iter()
        .filter(|complaint| {
            complaint.title.to_lowercase().contains(&query)
                || complaint.description.to_lowercase().contains(&query)
                || complaint.citizen.to_lowercase().contains(&query)
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
/// Загруженный список жалоб и производные представления над ним.
pub struct ComplaintListView {
    complaints: Vec<Complaint>,
}

impl ComplaintListView {
    /// Создаёт представление над загруженной коллекцией.
    pub fn new(complaints: Vec<Complaint>) -> Self {
        Self { complaints }
    }

    /// Все жалобы в порядке загрузки.
    pub fn complaints(&self) -> &[Complaint] {
        &self.complaints
    }

    /// Жалоба по идентификатору.
    pub fn get(&self, id: i64) -> Option<&Complaint> {
        self.complaints.iter().find(|complaint| complaint.id == id)
    }

    /// Результат поиска по текущей коллекции.
    pub fn filtered(&self, query: Option<&str>) -> Vec<&Complaint> {
        filter_complaints(&self.complaints, query)
    }

    /// Заменяет жалобу подтверждённым сервером состоянием.
    ///
    /// Возвращает `false`, если жалобы с таким id в списке нет.
    pub fn apply_update(&mut self, updated: Complaint) -> bool {
        match self
            .complaints
            .iter_mut()
            .find(|complaint| complaint.id == updated.id)
        {
            Some(slot) => {
                *slot = updated;
                true
            }
            None => false,
        }
    }

    /// `limit` последних по дате создания жалоб, новые первыми.
    pub fn recent(&self, limit: usize) -> Vec<&Complaint> {
        let mut sorted: Vec<&Complaint> = self.complaints.iter().collect();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sorted.truncate(limit);
        sorted
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Строка сводки: статус, количество и доля от общего числа.
pub struct StatShare {
    /// Статус.
    pub status: String,
    /// Количество жалоб.
    pub count: u64,
    /// Доля в процентах.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
/// Сводка по статусам для отображения.
pub struct StatsSummary {
    /// Общее количество жалоб.
    pub total: u64,
    /// Строки по статусам в порядке сервера.
    pub shares: Vec<StatShare>,
}

impl StatsSummary {
    /// Считает общее количество и проценты. При нулевом total проценты равны 0.
    pub fn from_stats(stats: &[ComplaintStat]) -> Self {
        let total: u64 = stats.iter().map(|stat| stat.count).sum();
        let shares = stats
            .iter()
            .map(|stat| StatShare {
                status: stat.status.clone(),
                count: stat.count,
                percentage: if total > 0 {
                    stat.count as f64 * 100.0 / total as f64
                } else {
                    0.0
                },
            })
            .collect();

        Self { total, shares }
    }
}

/// Относительное время: `Just now`, `5h ago`, `3d ago`.
pub fn format_relative(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = (now - created_at).num_hours();
    if hours < 1 {
        "Just now".to_string()
    } else if hours < 24 {
        format!("{hours}h ago")
    } else {
        format!("{}d ago", hours / 24)
    }
}
