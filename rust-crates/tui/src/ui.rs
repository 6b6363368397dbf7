use chrono::Local;
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use itertools::Itertools;
use loud_game::{
    engine::SessionSnapshot,
    market::Board,
    record::{
        Location,
        PlayerRecord,
    },
    session::{
        GameView,
        InputEvent,
        Menu,
        ResultState,
        SelectOption,
        SelectState,
        SelectTarget,
        SessionState,
    },
    sync::SyncStatus,
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::{
    Stdout,
    stdout,
};
use unicode_width::{
    UnicodeWidthChar,
    UnicodeWidthStr,
};

pub type InputEventReceiver = EventStream;

/// What the run loop should do about a terminal event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiCommand {
    Quit,
    Refresh,
    Redraw,
    Input(InputEvent),
}

#[derive(Default)]
pub struct UiState {
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // one persistent Terminal so buffers survive across draws
    let terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &SessionSnapshot) -> Result<()> {
    if let Some(terminal) = state.terminal.as_mut() {
        terminal.draw(|f| ui(f, snap))?;
    }
    Ok(())
}

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input closed")),
    }
}

pub fn interpret_event(state: &SessionState, event: Event) -> Option<UiCommand> {
    match event {
        Event::Key(key) => interpret_key(state, key),
        Event::Resize(..) => Some(UiCommand::Redraw),
        _ => None,
    }
}

/// Maps a key press to a command for the given session state.
pub fn interpret_key(state: &SessionState, key: KeyEvent) -> Option<UiCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(UiCommand::Quit),
            _ => None,
        };
    }
    let input = |event| Some(UiCommand::Input(event));
    match state {
        SessionState::ShowLocation(location) => match key.code {
            KeyCode::Esc if *location != Location::Home => input(InputEvent::Cancel),
            KeyCode::Char('q') if *location == Location::Home => Some(UiCommand::Quit),
            KeyCode::Char('r') => Some(UiCommand::Refresh),
            KeyCode::Char(c) => location_key(*location, c).map(UiCommand::Input),
            _ => None,
        },
        SessionState::Select(select) => match key.code {
            KeyCode::Up | KeyCode::Char('k') => input(InputEvent::Up),
            KeyCode::Down | KeyCode::Char('j') => input(InputEvent::Down),
            KeyCode::Enter => input(InputEvent::Confirm),
            KeyCode::Esc => input(InputEvent::Cancel),
            KeyCode::Char('r') => Some(UiCommand::Refresh),
            KeyCode::Char('c') => match select.target {
                SelectTarget::Offers(board) => input(InputEvent::Open(Menu::CreateOffer(board))),
                _ => None,
            },
            KeyCode::Char(c) => slot(c).map(|index| UiCommand::Input(InputEvent::Slot(index))),
            _ => None,
        },
        SessionState::Enter(_) => match key.code {
            KeyCode::Enter => input(InputEvent::Confirm),
            KeyCode::Esc => input(InputEvent::Cancel),
            KeyCode::Backspace => input(InputEvent::Backspace),
            KeyCode::Char(c) => input(InputEvent::Char(c)),
            _ => None,
        },
        SessionState::Wait(_) => match key.code {
            KeyCode::Esc => input(InputEvent::Cancel),
            _ => None,
        },
        SessionState::Result(_) => input(InputEvent::Confirm),
    }
}

fn location_key(location: Location, c: char) -> Option<InputEvent> {
    let open = |menu| Some(InputEvent::Open(menu));
    match (location, c) {
        (Location::Home, 'f') => Some(InputEvent::Travel(Location::Forest)),
        (Location::Home, 's') => Some(InputEvent::Travel(Location::Shop)),
        (Location::Home, 'm') => Some(InputEvent::Travel(Location::Market)),
        (Location::Home, 'd') => Some(InputEvent::Travel(Location::Develop)),
        (Location::Home, 't') => Some(InputEvent::Travel(Location::Settings)),
        (Location::Forest, 'h') => open(Menu::Hunt),
        (Location::Forest, 'i') => open(Menu::StartingFunds),
        (Location::Shop, 'b') => open(Menu::Buy),
        (Location::Shop, 's') => open(Menu::Sell),
        (Location::Shop, 'u') => open(Menu::Upgrade),
        (Location::Shop, 'c') => open(Menu::BuyCharacter),
        (Location::Market, digit) => {
            let board = slot(digit).and_then(|index| Board::ALL.get(index).copied())?;
            open(Menu::Offers(board))
        }
        (Location::Develop, 'p') => open(Menu::GetPylons),
        _ => None,
    }
}

/// `1` to `9` pick the first nine entries.
fn slot(c: char) -> Option<usize> {
    match c.to_digit(10)? {
        0 => None,
        digit => Some(digit as usize - 1),
    }
}

pub fn help_line(state: &SessionState) -> &'static str {
    match state {
        SessionState::ShowLocation(Location::Home) => {
            "f forest | s shop | m market | d develop | t settings | r refresh | q quit"
        }
        SessionState::ShowLocation(Location::Forest) => {
            "h hunt | i starting funds | r refresh | Esc home"
        }
        SessionState::ShowLocation(Location::Shop) => {
            "b buy | s sell | u upgrade | c buy character | r refresh | Esc home"
        }
        SessionState::ShowLocation(Location::Market) => "1-6 order boards | r refresh | Esc home",
        SessionState::ShowLocation(Location::Develop) => "p get pylons | r refresh | Esc home",
        SessionState::ShowLocation(Location::Settings) => "Esc home",
        SessionState::Select(SelectState {
            target: SelectTarget::Offers(_),
            ..
        }) => "↑/↓ move | 1-9 pick | Enter fulfill | c create order | Esc back",
        SessionState::Select(_) => "↑/↓ move | 1-9 pick | Enter choose | Esc back",
        SessionState::Enter(_) => "type an amount | Backspace delete | Enter confirm | Esc back",
        SessionState::Wait(_) => "Esc stop waiting",
        SessionState::Result(_) => "any key to continue",
    }
}

/// Cuts `text` to at most `width` terminal columns, marking the cut.
pub fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn ui(f: &mut Frame, snap: &SessionSnapshot) {
    f.render_widget(Clear, f.area());
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(10), Constraint::Length(4)])
        .split(f.area());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(rows[0]);
    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(5)])
        .split(columns[1]);

    draw_situation(f, columns[0], snap);
    draw_character_sheet(f, side[0], &snap.player);
    draw_network(f, side[1], snap);
    let prompt = match &snap.state {
        SessionState::Enter(enter) => format!("> {}_", enter.input),
        _ => "> ".to_string(),
    };
    let help = Paragraph::new(vec![Line::from(help_line(&snap.state)), Line::from(prompt)])
        .block(Block::default().borders(Borders::ALL).title("Commands"));
    f.render_widget(help, rows[1]);
}

fn draw_situation(f: &mut Frame, area: Rect, snap: &SessionSnapshot) {
    let title = snap.state.location().label();
    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(area);
    f.render_widget(block, area);
    let width = inner.width as usize;
    match &snap.state {
        SessionState::ShowLocation(location) => {
            let lines = location_lines(*location, snap)
                .into_iter()
                .map(|line| Line::from(truncate(&line, width)))
                .collect::<Vec<_>>();
            f.render_widget(Paragraph::new(lines), inner);
        }
        SessionState::Select(select) => draw_select(f, inner, select, snap),
        SessionState::Enter(enter) => {
            let mut lines = vec![
                Line::from(enter.task.summary()),
                Line::from(""),
                Line::from(vec![
                    Span::raw(format!("{}: ", enter.field.label())),
                    Span::styled(
                        format!("{}_", enter.input),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                ]),
            ];
            if let Some(notice) = &enter.notice {
                lines.push(Line::from(""));
                lines.push(Line::styled(notice.clone(), Style::default().fg(Color::Red)));
            }
            f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
        }
        SessionState::Wait(wait) => {
            let operation = match &wait.operation_id {
                Some(id) => format!("Operation {}", short_id(id.as_str())),
                None => "Submitting to the ledger…".to_string(),
            };
            let lines = vec![
                Line::from(format!("{}…", wait.task.summary())),
                Line::from(""),
                Line::styled(operation, Style::default().fg(Color::Yellow)),
                Line::from("Waiting for the ledger to confirm."),
            ];
            f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
        }
        SessionState::Result(result) => {
            f.render_widget(Paragraph::new(result_lines(result)).wrap(Wrap { trim: false }), inner);
        }
    }
}

fn location_lines(location: Location, snap: &SessionSnapshot) -> Vec<String> {
    match location {
        Location::Home => vec![
            "You are at home. Where to?".to_string(),
            String::new(),
            "[f] Forest   hunt for gold".to_string(),
            "[s] Shop     buy, sell and upgrade gear".to_string(),
            "[m] Market   trade with other players".to_string(),
            "[d] Develop  request pylons".to_string(),
            "[t] Settings".to_string(),
        ],
        Location::Forest => vec![
            "The forest is full of monsters worth gold.".to_string(),
            String::new(),
            "[h] Hunt".to_string(),
            "[i] Get starting funds".to_string(),
        ],
        Location::Shop => vec![
            "The shopkeeper nods at you.".to_string(),
            String::new(),
            "[b] Buy item".to_string(),
            "[s] Sell item".to_string(),
            "[u] Upgrade item".to_string(),
            "[c] Buy character".to_string(),
        ],
        Location::Market => {
            let mut lines = vec!["Open orders from other players.".to_string(), String::new()];
            lines.extend(Board::ALL.iter().enumerate().map(|(index, board)| {
                format!(
                    "[{}] {} ({})",
                    index + 1,
                    board.label(),
                    snap.market.board(*board).len()
                )
            }));
            lines
        }
        Location::Develop => vec![
            "Developer tools.".to_string(),
            String::new(),
            format!("[p] Get {} pylons", snap.catalog.pylon_grant()),
        ],
        Location::Settings => {
            let key = snap
                .player
                .credential()
                .map(|credential| credential.fingerprint())
                .unwrap_or_else(|| "not provisioned".to_string());
            vec![
                format!("Player: {}", snap.player.name()),
                format!("Signing key: {key}"),
            ]
        }
    }
}

fn option_label(option: &SelectOption, player: &PlayerRecord) -> String {
    match option {
        SelectOption::Offer(offer) if offer.creator == player.name() => {
            format!("{option} (yours)")
        }
        _ => option.to_string(),
    }
}

fn draw_select(f: &mut Frame, area: Rect, select: &SelectState, snap: &SessionSnapshot) {
    let view = GameView {
        player: &snap.player,
        catalog: snap.catalog.as_ref(),
        market: &snap.market,
    };
    let options = select.target.options(&view);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(area);
    f.render_widget(
        Paragraph::new(select.target.title()).style(Style::default().add_modifier(Modifier::BOLD)),
        rows[0],
    );
    if options.is_empty() {
        f.render_widget(Paragraph::new("Nothing here yet."), rows[1]);
    } else {
        let width = (rows[1].width as usize).saturating_sub(2);
        let items = options
            .iter()
            .enumerate()
            .map(|(index, option)| {
                ListItem::new(truncate(
                    &format!("{}. {}", index + 1, option_label(option, &snap.player)),
                    width,
                ))
            })
            .collect::<Vec<_>>();
        let list = List::new(items)
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            .highlight_symbol("> ");
        let mut list_state =
            ListState::default().with_selected(Some(select.cursor.min(options.len() - 1)));
        f.render_stateful_widget(list, rows[1], &mut list_state);
    }
    if let Some(notice) = &select.notice {
        f.render_widget(
            Paragraph::new(notice.as_str()).style(Style::default().fg(Color::Red)),
            rows[2],
        );
    }
}

fn result_lines(result: &ResultState) -> Vec<Line<'static>> {
    let mut lines = match &result.outcome {
        Ok(report) => {
            let mut lines = vec![Line::styled(
                format!("{}: done", result.task.summary()),
                Style::default().fg(Color::Green),
            )];
            if !report.confirmation.message.is_empty() {
                lines.push(Line::from(report.confirmation.message.clone()));
            }
            lines
        }
        Err(reason) => vec![
            Line::styled(
                format!("{}: failed", result.task.summary()),
                Style::default().fg(Color::Red),
            ),
            Line::from(reason.clone()),
        ],
    };
    if let Some(id) = &result.operation_id {
        lines.push(Line::from(format!("Operation {}", short_id(id.as_str()))));
    }
    lines.push(Line::from(""));
    lines.push(Line::from("Press any key to continue."));
    lines
}

fn short_id(id: &str) -> String {
    truncate(id, 17)
}

fn draw_character_sheet(f: &mut Frame, area: Rect, player: &PlayerRecord) {
    let width = (area.width as usize).saturating_sub(2);
    let characters = if player.characters().is_empty() {
        "none".to_string()
    } else {
        player
            .characters()
            .iter()
            .map(|character| format!("{} Lv{}", character.kind.name(), character.level))
            .join(", ")
    };
    let mut lines = vec![
        Line::from(format!("Player: {}", player.name())),
        Line::from(format!("Gold: {}", player.gold())),
        Line::from(format!("Pylon: {}", player.pylon())),
        Line::from(truncate(&format!("Characters: {characters}"), width)),
        Line::from("Items:"),
    ];
    if player.items().is_empty() {
        lines.push(Line::from("  none"));
    }
    for item in player.items() {
        lines.push(Line::from(truncate(
            &format!("  {} (attack {})", item.spec(), item.attack),
            width,
        )));
    }
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Character"));
    f.render_widget(widget, area);
}

fn draw_network(f: &mut Frame, area: Rect, snap: &SessionSnapshot) {
    let width = (area.width as usize).saturating_sub(2);
    let status = match &snap.sync_status {
        SyncStatus::Synced => {
            let at = snap
                .player
                .synced_at()
                .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
                .unwrap_or_default();
            Line::styled(format!("Synced {at}"), Style::default().fg(Color::Green))
        }
        SyncStatus::Cached => Line::from("Cached, not yet synced"),
        SyncStatus::Stale(reason) => Line::styled(
            truncate(&format!("Stale: {reason}"), width),
            Style::default().fg(Color::Yellow),
        ),
    };
    let last = snap
        .player
        .last_operation()
        .map(short_id)
        .unwrap_or_else(|| "none".to_string());
    let lines = vec![
        status,
        Line::from(format!("In flight: {}", snap.in_flight)),
        Line::from(truncate(&format!("Last operation: {last}"), width)),
    ];
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Ledger"));
    f.render_widget(widget, area);
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use chrono::Utc;
    use loud_game::{
        catalog::GameCatalog,
        market::{
            Currency,
            Goods,
            MarketBook,
            Offer,
            OfferLeg,
            Side,
        },
        record::{
            AccountState,
            Item,
            ItemKind,
        },
    };
    use proptest::prelude::*;
    use ratatui::backend::TestBackend;
    use std::sync::Arc;

    fn press(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn at(location: Location) -> SessionState {
        SessionState::ShowLocation(location)
    }

    fn selecting(target: SelectTarget) -> SessionState {
        SessionState::Select(SelectState::new(target, at(Location::Market)))
    }

    fn input(event: InputEvent) -> Option<UiCommand> {
        Some(UiCommand::Input(event))
    }

    #[test]
    fn interpret_key__home_letters__travel() {
        assert_eq!(
            interpret_key(&at(Location::Home), press('f')),
            input(InputEvent::Travel(Location::Forest))
        );
        assert_eq!(
            interpret_key(&at(Location::Home), press('t')),
            input(InputEvent::Travel(Location::Settings))
        );
        assert_eq!(interpret_key(&at(Location::Home), press('q')), Some(UiCommand::Quit));
    }

    #[test]
    fn interpret_key__q_away_from_home__does_not_quit() {
        assert_eq!(interpret_key(&at(Location::Forest), press('q')), None);
        assert_eq!(
            interpret_key(&at(Location::Forest), key(KeyCode::Esc)),
            input(InputEvent::Cancel)
        );
    }

    #[test]
    fn interpret_key__ctrl_c__always_quits() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        let typing = SessionState::Enter(loud_game::session::EnterState {
            field: loud_game::session::AmountField::Pylon,
            input: String::new(),
            task: loud_game::session::Task::new(
                loud_game::catalog::Action::CreateBuyOffer,
                Default::default(),
            ),
            notice: None,
            back: Box::new(at(Location::Market)),
        });

        assert_eq!(interpret_key(&typing, ctrl_c), Some(UiCommand::Quit));
        assert_eq!(interpret_key(&typing, press('q')), input(InputEvent::Char('q')));
    }

    #[test]
    fn interpret_key__location_menus__open() {
        assert_eq!(
            interpret_key(&at(Location::Forest), press('h')),
            input(InputEvent::Open(Menu::Hunt))
        );
        assert_eq!(
            interpret_key(&at(Location::Shop), press('u')),
            input(InputEvent::Open(Menu::Upgrade))
        );
        assert_eq!(
            interpret_key(&at(Location::Develop), press('p')),
            input(InputEvent::Open(Menu::GetPylons))
        );
        assert_eq!(
            interpret_key(&at(Location::Market), press('3')),
            input(InputEvent::Open(Menu::Offers(Board::new(Goods::Item, Side::Buy))))
        );
        assert_eq!(interpret_key(&at(Location::Market), press('7')), None);
    }

    #[test]
    fn interpret_key__select__digits_pick_one_based_slots() {
        let state = selecting(SelectTarget::ShopItem);

        assert_eq!(interpret_key(&state, press('2')), input(InputEvent::Slot(1)));
        assert_eq!(interpret_key(&state, press('0')), None);
        assert_eq!(interpret_key(&state, press('j')), input(InputEvent::Down));
        assert_eq!(interpret_key(&state, key(KeyCode::Up)), input(InputEvent::Up));
        assert_eq!(interpret_key(&state, press('c')), None);
    }

    #[test]
    fn interpret_key__offer_board__c_creates_order_on_same_board() {
        let board = Board::new(Goods::Gold, Side::Sell);

        let command = interpret_key(&selecting(SelectTarget::Offers(board)), press('c'));

        assert_eq!(command, input(InputEvent::Open(Menu::CreateOffer(board))));
    }

    #[test]
    fn interpret_key__released_key__is_ignored() {
        let release = KeyEvent::new_with_kind(
            KeyCode::Char('f'),
            KeyModifiers::NONE,
            KeyEventKind::Release,
        );

        assert_eq!(interpret_key(&at(Location::Home), release), None);
    }

    #[test]
    fn interpret_event__resize__redraws() {
        assert_eq!(
            interpret_event(&at(Location::Home), Event::Resize(80, 24)),
            Some(UiCommand::Redraw)
        );
    }

    #[test]
    fn truncate__short_text__is_untouched() {
        assert_eq!(truncate("Tiger", 10), "Tiger");
    }

    #[test]
    fn truncate__long_text__ends_with_ellipsis() {
        assert_eq!(truncate("Wooden sword Lv1", 8), "Wooden …");
        assert_eq!(truncate("anything", 0), "");
    }

    proptest! {
        #[test]
        fn truncate__never_exceeds_width(text in "\\PC{0,40}", width in 0usize..30) {
            prop_assert!(truncate(&text, width).width() <= width);
        }
    }

    fn snapshot(state: SessionState, market: MarketBook) -> SessionSnapshot {
        let mut player = PlayerRecord::new("alice");
        player.apply_account(
            AccountState {
                gold: 120,
                pylon: 7,
                items: vec![Item {
                    id: "item-1".into(),
                    kind: ItemKind::WoodenSword,
                    level: 1,
                    attack: 3,
                }],
                characters: Vec::new(),
            },
            Utc::now(),
        );
        SessionSnapshot {
            state,
            player,
            market,
            catalog: Arc::new(GameCatalog::default()),
            sync_status: SyncStatus::Synced,
            in_flight: 0,
            dirty: true,
        }
    }

    fn render(snap: &SessionSnapshot) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();
        terminal.draw(|f| ui(f, snap)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn ui__home__shows_balances_and_destinations() {
        let screen = render(&snapshot(at(Location::Home), MarketBook::default()));

        assert!(screen.contains("Gold: 120"));
        assert!(screen.contains("Pylon: 7"));
        assert!(screen.contains("Wooden sword Lv1 (attack 3)"));
        assert!(screen.contains("[m] Market"));
    }

    #[test]
    fn ui__offer_board__flags_own_orders() {
        // given
        let board = Board::new(Goods::Gold, Side::Buy);
        let offer = |id: &str, creator: &str| Offer {
            id: id.into(),
            creator: creator.into(),
            give: OfferLeg::coins(Currency::Pylon, 5),
            want: OfferLeg::coins(Currency::Gold, 50),
        };
        let market = MarketBook::from_offers(vec![offer("o1", "alice"), offer("o2", "bob")]);

        // when
        let screen = render(&snapshot(selecting(SelectTarget::Offers(board)), market));

        // then
        assert!(screen.contains("by alice (yours)"));
        assert!(screen.contains("by bob"));
        assert!(!screen.contains("by bob (yours)"));
    }
}
