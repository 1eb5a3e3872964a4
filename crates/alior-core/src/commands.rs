//! Main menu commands and the labels that trigger them

/// A main menu action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Register the user and show the menu
    Start,
    /// Abandon whatever flow is in progress
    MainMenu,
    CreateEvent,
    MyEvents,
    DeleteEvent,
    CreateGroup,
    MyGroups,
    DeleteGroup,
    LeaveGroup,
}

/// Every text that resolves to a command. The first label of each command is
/// the one shown on its button.
const COMMAND_LABELS: &[(&str, Command)] = &[
    ("/start", Command::Start),
    ("Главное меню", Command::MainMenu),
    ("/menu", Command::MainMenu),
    ("/cancel", Command::MainMenu),
    ("Создать событие", Command::CreateEvent),
    ("Мои события", Command::MyEvents),
    ("Удалить событие", Command::DeleteEvent),
    ("Создать группу", Command::CreateGroup),
    ("Мои группы", Command::MyGroups),
    ("Удалить группу", Command::DeleteGroup),
    ("Покинуть группу", Command::LeaveGroup),
];

impl Command {
    /// Commands offered as main menu buttons, in display order
    pub const MENU: [Command; 7] = [
        Command::CreateEvent,
        Command::MyEvents,
        Command::DeleteEvent,
        Command::CreateGroup,
        Command::MyGroups,
        Command::DeleteGroup,
        Command::LeaveGroup,
    ];

    /// Resolve user text to a command, ignoring case and surrounding whitespace
    pub fn lookup(text: &str) -> Option<Command> {
        let text = text.trim();
        COMMAND_LABELS
            .iter()
            .find(|(label, _)| label.to_lowercase() == text.to_lowercase())
            .map(|(_, command)| *command)
    }

    /// Button label
    pub fn label(&self) -> &'static str {
        COMMAND_LABELS
            .iter()
            .find(|(_, command)| command == self)
            .map(|(label, _)| *label)
            .unwrap_or_default()
    }

    /// Accepted from any step, cancelling the current flow
    pub fn is_universal(&self) -> bool {
        matches!(self, Command::Start | Command::MainMenu)
    }
}
