//! User-facing texts and buttons

use alior_api::{
    Category, Event, Group, GroupView, MembershipRemoval, OutboundMessage, ReplyOption, User,
};
use alior_util::{
    format_date_token, format_datetime_token, format_duration, AliorError, DurationError, UserId,
};

use crate::{Command, Notice, Picker, Prompt, ALL_DAY_LABEL, DONE_LABEL, SKIP_LABEL};

fn main_menu_button() -> ReplyOption {
    ReplyOption::text(Command::MainMenu.label())
}

fn menu_options() -> Vec<ReplyOption> {
    Command::MENU
        .iter()
        .map(|c| ReplyOption::text(c.label()))
        .collect()
}

fn with_notice(notice: Option<&Notice>, text: &str) -> String {
    match notice {
        Some(notice) => format!("{}\n\n{}", notice_text(notice), text),
        None => text.to_string(),
    }
}

fn notice_text(notice: &Notice) -> String {
    match notice {
        Notice::UnknownCommand => "Не понимаю эту команду.".into(),
        Notice::FinishOrCancel => {
            "Сначала завершите текущее действие или вернитесь в главное меню.".into()
        }
        Notice::UseButtons => "Пожалуйста, выберите вариант кнопкой.".into(),
        Notice::TypeText => "Пожалуйста, ответьте текстом.".into(),
        Notice::StaleSelection => "Эта кнопка больше не действует.".into(),
        Notice::InvalidCategory => {
            let labels: Vec<_> = Category::ALL.iter().map(|c| c.label()).collect();
            format!("Выберите одну из категорий: {}.", labels.join(", "))
        }
        Notice::EmptyName => "Название не может быть пустым.".into(),
        Notice::InvalidDateTime => "Не удалось разобрать дату и время.".into(),
        Notice::InvalidDate => "Не удалось разобрать дату.".into(),
        Notice::InvalidDuration(e) => format!("Неверная длительность: {}.", duration_error_text(e)),
        Notice::NoNewMembers => "Новых имён пользователей не найдено.".into(),
        Notice::Superseded => {
            "Сообщение пришло одновременно с предыдущим и не было обработано.".into()
        }
    }
}

fn duration_error_text(e: &DurationError) -> String {
    match e {
        DurationError::Empty => "пустое значение".into(),
        DurationError::UnexpectedChar { found, position } => {
            format!("лишний символ «{}» в позиции {}", found, position + 1)
        }
        DurationError::MissingNumber(unit) => format!("перед «{}» нет числа", unit),
        DurationError::MissingUnit => "у числа нет единицы (d, h или m)".into(),
        DurationError::OutOfOrder(unit) => {
            format!("«{}» повторяется или нарушен порядок d, h, m", unit)
        }
        DurationError::Overflow => "слишком большое значение".into(),
    }
}

/// Render a text prompt
pub fn prompt(user: UserId, prompt: &Prompt, notice: Option<&Notice>) -> OutboundMessage {
    let (text, mut options) = match prompt {
        Prompt::MainMenu => {
            let msg = OutboundMessage::new(user, with_notice(notice, "Главное меню. Выберите действие:"));
            return msg.with_options(menu_options());
        }
        Prompt::Category => (
            "Выберите категорию события:".to_string(),
            Category::ALL
                .iter()
                .map(|c| ReplyOption::text(c.label()))
                .collect(),
        ),
        Prompt::EventName => ("Введите название события:".to_string(), Vec::new()),
        Prompt::StartTime => (
            format!(
                "Введите дату и время начала в формате дд.мм.гггг чч:мм или нажмите «{}».",
                ALL_DAY_LABEL
            ),
            vec![ReplyOption::text(ALL_DAY_LABEL)],
        ),
        Prompt::AllDayDate => ("Введите дату в формате дд.мм.гггг:".to_string(), Vec::new()),
        Prompt::Duration => (
            format!(
                "Введите длительность, например 1d2h30m, 2h или 45m, или нажмите «{}».",
                SKIP_LABEL
            ),
            vec![ReplyOption::text(SKIP_LABEL)],
        ),
        Prompt::GroupName => ("Введите название группы:".to_string(), Vec::new()),
        Prompt::Members { collected } => {
            let mut text = format!(
                "Отправьте имена участников (@username), можно несколько сразу. \
                 Когда закончите, нажмите «{}».",
                DONE_LABEL
            );
            if !collected.is_empty() {
                text.push_str(&format!("\nДобавлены: {}", collected.join(", ")));
            }
            (text, vec![ReplyOption::text(DONE_LABEL)])
        }
    };

    options.push(main_menu_button());
    OutboundMessage::new(user, with_notice(notice, &text)).with_options(options)
}

fn picker_title(picker: Picker) -> &'static str {
    match picker {
        Picker::GroupForEvent => "Выберите группу для события:",
        Picker::EventToDelete => "Выберите событие для удаления:",
        Picker::GroupToDelete => "Выберите группу для удаления:",
        Picker::GroupToLeave => "Выберите группу, которую хотите покинуть:",
    }
}

/// Render a button list
pub fn picker(
    user: UserId,
    picker: Picker,
    mut options: Vec<ReplyOption>,
    notice: Option<&Notice>,
) -> OutboundMessage {
    options.push(main_menu_button());
    OutboundMessage::new(user, with_notice(notice, picker_title(picker))).with_options(options)
}

/// Reply when a picker would have no buttons
pub fn empty_picker(user: UserId, picker: Picker) -> OutboundMessage {
    let text = match picker {
        Picker::GroupForEvent => {
            "Нет групп, в которых вы администратор. Сначала создайте группу."
        }
        Picker::EventToDelete => "Нет событий, которые вы можете удалить.",
        Picker::GroupToDelete => "Нет групп, в которых вы администратор.",
        Picker::GroupToLeave => "Вы не состоите ни в одной группе.",
    };
    OutboundMessage::new(user, text).with_options(menu_options())
}

/// Button label for an event
pub fn event_label(event: &Event) -> String {
    if event.all_day {
        format!("{} ({})", event.name, format_date_token(&event.start))
    } else {
        format!("{} ({})", event.name, format_datetime_token(&event.start))
    }
}

fn event_line(event: &Event) -> String {
    let when = if event.all_day {
        format!("{}, весь день", format_date_token(&event.start))
    } else {
        format_datetime_token(&event.start)
    };
    let mut line = format!("• {} [{}] {}", when, event.category.label(), event.name);
    let duration = format_duration(event.duration);
    if !duration.is_empty() {
        line.push_str(&format!(", {}", duration));
    }
    line.push_str(&format!(" ({})", event.status.label()));
    line
}

/// "Мои события"
pub fn events(user: UserId, events: &[Event]) -> OutboundMessage {
    let text = if events.is_empty() {
        "У вас пока нет событий.".to_string()
    } else {
        let lines: Vec<_> = events.iter().map(event_line).collect();
        format!("Ваши события:\n{}", lines.join("\n"))
    };
    OutboundMessage::new(user, text).with_options(menu_options())
}

/// "Мои группы"
pub fn groups(user: UserId, groups: &[GroupView]) -> OutboundMessage {
    let text = if groups.is_empty() {
        "Вы не состоите ни в одной группе.".to_string()
    } else {
        let lines: Vec<_> = groups
            .iter()
            .map(|g| {
                let role = if g.is_admin { ", администратор" } else { "" };
                format!("• {} (участников: {}{})", g.group.name, g.member_count, role)
            })
            .collect();
        format!("Ваши группы:\n{}", lines.join("\n"))
    };
    OutboundMessage::new(user, text).with_options(menu_options())
}

pub fn welcome(user: UserId, registered: &User) -> OutboundMessage {
    OutboundMessage::new(
        user,
        format!("Привет, {}! Выберите действие:", registered.user_name),
    )
    .with_options(menu_options())
}

pub fn event_created(user: UserId, event: &Event, group: &Group) -> OutboundMessage {
    OutboundMessage::new(
        user,
        format!(
            "Событие создано в группе «{}»:\n{}",
            group.name,
            event_line(event)
        ),
    )
    .with_options(menu_options())
}

pub fn group_created(
    user: UserId,
    group: &Group,
    added: &[User],
    unknown: &[String],
) -> OutboundMessage {
    let mut text = format!("Группа «{}» создана. Вы её администратор.", group.name);
    if !added.is_empty() {
        let names: Vec<_> = added.iter().map(|u| format!("@{}", u.user_name)).collect();
        text.push_str(&format!("\nУчастники: {}", names.join(", ")));
    }
    if !unknown.is_empty() {
        let names: Vec<_> = unknown.iter().map(|n| format!("@{}", n)).collect();
        text.push_str(&format!(
            "\nНе найдены (сначала им нужно написать боту /start): {}",
            names.join(", ")
        ));
    }
    OutboundMessage::new(user, text).with_options(menu_options())
}

pub fn event_deleted(user: UserId, event: &Event) -> OutboundMessage {
    OutboundMessage::new(user, format!("Событие «{}» удалено.", event.name))
        .with_options(menu_options())
}

pub fn group_deleted(user: UserId, group: &Group) -> OutboundMessage {
    OutboundMessage::new(
        user,
        format!("Группа «{}» удалена вместе с её событиями.", group.name),
    )
    .with_options(menu_options())
}

pub fn group_left(
    user: UserId,
    group: &Group,
    outcome: &MembershipRemoval,
    new_admin: Option<&User>,
) -> OutboundMessage {
    let mut text = format!("Вы покинули группу «{}».", group.name);
    match outcome {
        MembershipRemoval::Removed => {}
        MembershipRemoval::AdminTransferred { new_admin: id } => {
            let who = new_admin
                .map(|u| format!("@{}", u.user_name))
                .unwrap_or_else(|| id.to_string());
            text.push_str(&format!("\nНовый администратор: {}.", who));
        }
        MembershipRemoval::GroupDeleted => {
            text.push_str("\nВ группе не осталось участников, она удалена.");
        }
    }
    OutboundMessage::new(user, text).with_options(menu_options())
}

/// Terminal reply for a failed action
pub fn failure(user: UserId, error: &AliorError) -> OutboundMessage {
    let text = match error {
        AliorError::ValidationError(msg) => format!("Некорректные данные: {}", msg),
        AliorError::NotFound(_) => "Не найдено: возможно, это уже удалили.".to_string(),
        AliorError::PermissionDenied(_) => {
            "Это действие доступно только администратору группы.".to_string()
        }
        AliorError::PersistenceError(_) | AliorError::ConfigError(_) => {
            "Не удалось выполнить действие. Попробуйте позже.".to_string()
        }
        AliorError::Internal(_) => "Что-то пошло не так. Попробуйте ещё раз.".to_string(),
    };
    OutboundMessage::new(user, text).with_options(menu_options())
}
