// Database explorer: an in-memory LCA database shown as a grouped tree table.
//
// Keys: arrows/hjkl navigate, Shift+arrows move the column cursor, `f` opens
// the header menu, `/` starts a quick search (prefix `=` for a raw query),
// `s` flips the sort on the current column, `e` edits the current cell,
// `q` quits.
use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::Clear;
use ratatui::{DefaultTerminal, Frame};

use tui_treetable::{
    CellValue, ChangeBus, Decoration, DecorationTable, EditTarget, FilterStatus, Font,
    HeaderMenu, HeaderMenuView, KeymapProfile, MemorySettings, MenuAction, ModelConfig, Row, RowKind,
    SettingsStore, Snapshot, SnapshotSource, SortOrder, Subscription, TableModel, TreeAction,
    TreeEvent, TreeTable, TreeTableStyle, TreeView, ViewConfig,
};

const DATABASE: &str = "ecoinvent-demo";
const SETTINGS_SECTION: &str = "database_explorer";
const COLUMNS: [&str; 6] = ["Activity", "Product", "Type", "Unit", "Location", "Amount"];

const PROCESS: RowKind = RowKind("process");
const PRODUCT: RowKind = RowKind("product");
const PROCESS_WITH_PRODUCT: RowKind = RowKind("processwithreferenceproduct");
const WASTE: RowKind = RowKind("waste");
const BIOSPHERE: RowKind = RowKind("biosphere");

struct Activity {
    name: String,
    product: String,
    kind: &'static str,
    unit: &'static str,
    location: &'static str,
    amount: f64,
}

// Stand-in for the external entity store: owns the data and the change bus.
struct Store {
    activities: Vec<Activity>,
    bus: ChangeBus<String>,
}

impl Store {
    fn seeded() -> Self {
        let seed = [
            ("steel production", "steel", "processwithreferenceproduct", "kg", "GLO", 1.0),
            ("steel production", "steel", "processwithreferenceproduct", "kg", "RER", 1.0),
            ("market for steel", "steel", "process", "kg", "GLO", 1.0),
            ("copper mining", "copper concentrate", "processwithreferenceproduct", "kg", "CL", 1.0),
            ("copper refining", "copper", "processwithreferenceproduct", "kg", "GLO", 1.0),
            ("copper", "copper", "product", "kg", "GLO", 1.0),
            ("scrap treatment", "scrap steel", "waste", "kg", "CH", -1.0),
            ("electricity, high voltage", "electricity", "processwithreferenceproduct", "kWh", "CH", 1.0),
            ("electricity, high voltage", "electricity", "processwithreferenceproduct", "kWh", "DE", 1.0),
            ("carbon dioxide, fossil", "", "emission", "kg", "", 0.0),
            ("water, river", "", "natural resource", "m3", "", 0.0),
        ];
        let activities = seed
            .into_iter()
            .map(|(name, product, kind, unit, location, amount)| Activity {
                name: name.to_string(),
                product: product.to_string(),
                kind,
                unit,
                location,
                amount,
            })
            .collect();
        Self {
            activities,
            bus: ChangeBus::new(),
        }
    }
}

impl SnapshotSource<usize, String> for Store {
    fn snapshot(&self, _database: &String) -> Snapshot<usize> {
        let mut snapshot = Snapshot::new(COLUMNS);
        for (key, activity) in self.activities.iter().enumerate() {
            let location = (!activity.location.is_empty()).then_some(activity.location);
            snapshot.push(
                Row::new(key)
                    .with("Activity", activity.name.as_str())
                    .with("Product", activity.product.as_str())
                    .with("Type", activity.kind)
                    .with("Unit", activity.unit)
                    .with("Location", location)
                    .with("Amount", activity.amount),
            );
        }
        snapshot
    }
}

impl EditTarget<usize> for Store {
    type EntityKey = usize;

    fn owning_entity(&self, reference: &usize) -> usize {
        *reference
    }

    fn update_field(&mut self, reference: &usize, field: &str, value: CellValue) {
        if let (Some(activity), "amount") = (self.activities.get_mut(*reference), field) {
            activity.amount = value.as_f64().unwrap_or(activity.amount);
        }
        self.bus.notify(&DATABASE.to_string());
    }

    fn update_entity(&mut self, entity: usize, field: &str, value: CellValue) {
        let Some(activity) = self.activities.get_mut(entity) else {
            return;
        };
        let text = value.to_string();
        match field {
            "name" => activity.name = text,
            "reference product" => activity.product = text,
            _ => return,
        }
        self.bus.notify(&DATABASE.to_string());
    }
}

fn classify(row: &Row<usize>) -> Option<RowKind> {
    match row.get("Type").as_text()? {
        "process" | "multifunctional" | "nonfunctional" => Some(PROCESS),
        "product" => Some(PRODUCT),
        "processwithreferenceproduct" => Some(PROCESS_WITH_PRODUCT),
        "waste" => Some(WASTE),
        "emission" | "natural resource" | "economic" | "inventory indicator" | "social" => {
            Some(BIOSPHERE)
        }
        _ => None,
    }
}

fn decorations() -> DecorationTable<usize> {
    DecorationTable::new(classify)
        .rule(PROCESS, "Activity", Decoration::glyph("⚙"))
        .rule(PROCESS_WITH_PRODUCT, "Activity", Decoration::glyph("⚙"))
        .rule(PROCESS_WITH_PRODUCT, "Product", Decoration::glyph("◆"))
        .rule(PRODUCT, "Product", Decoration::glyph("◆").with_font(Font::Bold))
        .rule(WASTE, "Product", Decoration::glyph("♻").with_font(Font::Italic))
        .rule(BIOSPHERE, "Activity", Decoration::glyph("☁").with_font(Font::Italic))
}

enum Mode {
    Browse,
    Search,
    Menu(HeaderMenu),
    Edit { section: usize, buffer: String },
}

struct App {
    store: Store,
    subscription: Subscription<String>,
    settings: MemorySettings,
    model: TableModel<usize>,
    view: TreeView,
    mode: Mode,
    status: String,
}

impl App {
    fn new() -> Self {
        let store = Store::seeded();
        let subscription = store.bus.subscribe(DATABASE.to_string());
        let config = ModelConfig::default().lock_column("Type").lock_column("Unit");
        let mut model = TableModel::new(config).with_decorations(decorations());
        let mut view = TreeView::new(ViewConfig::default());
        if std::env::args().any(|arg| arg == "--vim") {
            view.state_mut().keymap_mut().set_profile(KeymapProfile::Vim);
        }
        if std::env::args().any(|arg| arg == "--no-guides") {
            view.state_mut().set_draw_lines(false);
        }
        view.bind(&model);

        let mut settings = MemorySettings::new();
        let mut state = tui_treetable::ViewState::default_for(&COLUMNS);
        state.grouped_columns = vec!["Location".to_string()];
        settings.save(SETTINGS_SECTION, DATABASE, state);

        let snapshot = store.snapshot(&DATABASE.to_string());
        let status = match view.load_from(&mut model, &settings, SETTINGS_SECTION, DATABASE, snapshot) {
            Ok(_) => format!("{} rows", model.tree().leaf_count()),
            Err(err) => err.to_string(),
        };
        Self {
            store,
            subscription,
            settings,
            model,
            view,
            mode: Mode::Browse,
            status,
        }
    }

    fn refresh(&mut self) {
        if self.model.refresh_from(&self.subscription, &self.store)
            && let Err(err) = self.view.sync(&self.model)
        {
            self.status = err.to_string();
        }
    }

    fn apply_menu(&mut self, action: MenuAction) {
        if let Err(err) = self.view.apply_menu_action(&mut self.model, action) {
            self.status = err.to_string();
        }
    }

    // Returns `false` when the app should quit.
    fn on_key(&mut self, key: KeyEvent) -> bool {
        match std::mem::replace(&mut self.mode, Mode::Browse) {
            Mode::Browse => return self.on_browse_key(key),
            Mode::Search => self.on_search_key(key),
            Mode::Menu(menu) => self.on_menu_key(menu, key),
            Mode::Edit { section, buffer } => self.on_edit_key(section, buffer, key),
        }
        true
    }

    fn on_browse_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Char('s') => {
                let section = self.view.selected_section();
                if let Some(column) = self.model.columns().get(section).cloned() {
                    let order = match (self.model.sort_column() == Some(column.as_str()), self.model.sort_order()) {
                        (true, SortOrder::Ascending) => SortOrder::Descending,
                        _ => SortOrder::Ascending,
                    };
                    if let Err(err) = self.view.sort_by(&mut self.model, &column, order) {
                        self.status = err.to_string();
                    }
                }
            }
            KeyCode::Char('e') => {
                if let Some(item) = self.view.selected_item() {
                    let section = self.view.selected_section();
                    let current = self.model.data(item, section, tui_treetable::ItemRole::Display);
                    self.mode = Mode::Edit {
                        section,
                        buffer: current.text().into_owned(),
                    };
                }
            }
            _ => match self.view.handle_key(&self.model, key) {
                Ok(TreeEvent::Action(TreeAction::HeaderMenu)) => {
                    match self.view.header_menu(&self.model, self.view.selected_section()) {
                        Ok(menu) => self.mode = Mode::Menu(menu),
                        Err(err) => self.status = err.to_string(),
                    }
                }
                Ok(TreeEvent::Action(TreeAction::QuickSearch)) => self.mode = Mode::Search,
                Ok(TreeEvent::Action(TreeAction::Open)) => {
                    if let Ok(refs) = self.view.selected_references(&self.model) {
                        self.status = format!("open activity {refs:?}");
                    }
                }
                Ok(_) => {}
                Err(err) => self.status = err.to_string(),
            },
        }
        true
    }

    fn on_search_key(&mut self, key: KeyEvent) {
        let mut text = self.view.all_filter().to_string();
        match key.code {
            KeyCode::Enter | KeyCode::Esc => return,
            KeyCode::Backspace => {
                text.pop();
            }
            KeyCode::Char(ch) => text.push(ch),
            _ => {}
        }
        if let Err(err) = self.view.set_all_filter(&mut self.model, &text) {
            self.status = err.to_string();
        }
        self.mode = Mode::Search;
    }

    fn on_menu_key(&mut self, mut menu: HeaderMenu, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => return,
            KeyCode::Up => menu.select_prev(),
            KeyCode::Down => menu.select_next(),
            KeyCode::Backspace => self.apply_menu(menu.pop_char()),
            KeyCode::Char(ch) => self.apply_menu(menu.push_char(ch)),
            KeyCode::Enter => match menu.activate() {
                Some(MenuAction::ToggleColumn(section)) => {
                    self.apply_menu(MenuAction::ToggleColumn(section));
                    menu.mark_visible(section, !self.view.is_column_hidden(&self.model, section));
                }
                Some(action) => {
                    self.apply_menu(action);
                    return;
                }
                None => {}
            },
            _ => {}
        }
        self.mode = Mode::Menu(menu);
    }

    fn on_edit_key(&mut self, section: usize, mut buffer: String, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => return,
            KeyCode::Enter => {
                let Some(item) = self.view.selected_item() else {
                    return;
                };
                let value = buffer
                    .parse::<f64>()
                    .map_or_else(|_| CellValue::from(buffer.as_str()), CellValue::from);
                match self.model.set_data(item, section, value, &mut self.store) {
                    Ok(route) => self.status = format!("edit routed to {route:?}"),
                    Err(err) => self.status = err.to_string(),
                }
                self.refresh();
                return;
            }
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(ch) => buffer.push(ch),
            _ => {}
        }
        self.mode = Mode::Edit { section, buffer };
    }

    fn render(&mut self, frame: &mut Frame, style: &TreeTableStyle<'_>) {
        let [table_area, status_area] =
            Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());
        frame.render_stateful_widget(TreeTable::new(&self.model, style.clone()), table_area, &mut self.view);

        let status = match &self.mode {
            Mode::Search => {
                let failed = self.view.filter_status() == FilterStatus::Failed;
                let color = if failed { Color::Red } else { Color::Reset };
                Line::styled(format!("/{}", self.view.all_filter()), Style::default().fg(color))
            }
            Mode::Edit { buffer, .. } => Line::from(format!("edit: {buffer}")),
            _ => Line::from(self.status.as_str()),
        };
        frame.render_widget(status, status_area);

        if let Mode::Menu(menu) = &self.mode {
            let popup = centered(table_area, 32, 14);
            frame.render_widget(Clear, popup);
            frame.render_widget(HeaderMenuView::new(menu), popup);
        }
    }

    fn save(&mut self) {
        if let Err(err) = self.view.save_to(&self.model, &mut self.settings, SETTINGS_SECTION, DATABASE) {
            self.status = err.to_string();
        }
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn run_app(mut terminal: DefaultTerminal, mut app: App, style: TreeTableStyle<'_>) -> io::Result<()> {
    loop {
        app.refresh();
        terminal.draw(|frame| app.render(frame, &style))?;

        if event::poll(Duration::from_millis(200))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if !app.on_key(key) {
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    app.save();
    Ok(())
}

fn main() -> io::Result<()> {
    let mut style = TreeTableStyle::default();
    style.block_style = Style::default()
        .fg(Color::Rgb(221, 227, 235))
        .bg(Color::Rgb(24, 28, 36));
    style.border_style = Style::default().fg(Color::Rgb(92, 110, 140));
    style.line_style = Style::default().fg(Color::Rgb(86, 98, 120));
    style.header_style = Style::default()
        .fg(Color::Rgb(229, 201, 133))
        .add_modifier(Modifier::BOLD);
    style.highlight_style = Style::default()
        .fg(Color::Rgb(255, 255, 255))
        .bg(Color::Rgb(52, 66, 96))
        .add_modifier(Modifier::BOLD);
    style.title = Some(Line::from(DATABASE));

    let app = App::new();
    let terminal = ratatui::init();
    let result = run_app(terminal, app, style);
    ratatui::restore();
    result
}
