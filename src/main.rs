//! Whoop workouts dashboard: record types, settings and the egui application.

use dirs_next as dirs;
use eframe::{App, Frame, NativeOptions, egui};
use egui_extras::DatePickerButton;
use egui_plot::{Legend, Line, Plot, PlotPoints, Points};
use rfd::FileDialog;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use chrono::{Days, NaiveDate};
use log::info;

mod dashboard;
use dashboard::{Dashboard, QueryOptions, QueryOutcome};
mod export;
use export::{save_rows_csv, save_rows_json};
mod fetch;
use fetch::{FetchAdapter, RecordKind, SnapshotSink};
mod flatten;
use flatten::day_label;
mod range;
use range::{Layout, Preset, RangeSelection, local_today};
mod report;
use report::export_html_report;
mod whoop;
use whoop::{Credentials, WhoopClient};

/// Record identifiers arrive as numbers or strings depending on the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{n}"),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

/// Scoring status of a record. Values this build does not know are kept
/// verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum ScoreState {
    Scored,
    PendingScore,
    Unscorable,
    Other(String),
}

impl ScoreState {
    pub fn as_str(&self) -> &str {
        match self {
            ScoreState::Scored => "SCORED",
            ScoreState::PendingScore => "PENDING_SCORE",
            ScoreState::Unscorable => "UNSCORABLE",
            ScoreState::Other(raw) => raw,
        }
    }
}

impl From<String> for ScoreState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "SCORED" => ScoreState::Scored,
            "PENDING_SCORE" => ScoreState::PendingScore,
            "UNSCORABLE" => ScoreState::Unscorable,
            _ => ScoreState::Other(raw),
        }
    }
}

impl From<ScoreState> for String {
    fn from(state: ScoreState) -> Self {
        match state {
            ScoreState::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// Milliseconds spent in each heart-rate zone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ZoneDurations {
    pub zone_zero_milli: Option<i64>,
    pub zone_one_milli: Option<i64>,
    pub zone_two_milli: Option<i64>,
    pub zone_three_milli: Option<i64>,
    pub zone_four_milli: Option<i64>,
    pub zone_five_milli: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Score {
    pub strain: Option<f64>,
    pub average_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub kilojoule: Option<f64>,
    pub percent_recorded: Option<f64>,
    pub distance_meter: Option<f64>,
    pub altitude_gain_meter: Option<f64>,
    pub altitude_change_meter: Option<f64>,
    pub zone_duration: Option<ZoneDurations>,
}

/// A single workout as returned by the workout collection endpoint.
///
/// Every field is optional so partially scored or trimmed records still load.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkoutRecord {
    pub id: Option<RecordId>,
    pub user_id: Option<RecordId>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub timezone_offset: Option<String>,
    pub sport_id: Option<i64>,
    pub score_state: Option<ScoreState>,
    pub score: Option<Score>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CycleScore {
    pub strain: Option<f64>,
    pub kilojoule: Option<f64>,
    pub average_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
}

/// A physiological cycle, the day-level unit of the Whoop platform.
/// `end` stays empty while the cycle is still open.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CycleRecord {
    pub id: Option<RecordId>,
    pub user_id: Option<RecordId>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub timezone_offset: Option<String>,
    pub score_state: Option<ScoreState>,
    pub score: Option<CycleScore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingVar(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(name) => write!(f, "{name} is not set"),
        }
    }
}

impl std::error::Error for ConfigError {}

const USERNAME_VAR: &str = "WHOOP_USERNAME";
const PASSWORD_VAR: &str = "WHOOP_PASSWORD";

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

/// Read the Whoop login from `WHOOP_USERNAME` and `WHOOP_PASSWORD`.
fn credentials_from_env() -> Result<Credentials, ConfigError> {
    Ok(Credentials {
        username: required_var(USERNAME_VAR)?,
        password: required_var(PASSWORD_VAR)?,
    })
}

fn default_date_input() -> String {
    "2022-10-12".to_string()
}

/// Persistent user preferences, stored as JSON in the config directory.
///
/// Fields missing from an older file fall back to [`Settings::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct Settings {
    layout: Layout,
    record_kind: RecordKind,
    preset: Preset,
    date_input: String,
    custom_start: Option<NaiveDate>,
    custom_end: Option<NaiveDate>,
    exclude_today: bool,
    save_snapshot: bool,
    /// Directory for the raw snapshot; the working directory when unset.
    snapshot_dir: Option<String>,
    page_size: usize,
}

impl Settings {
    const FILE: &'static str = "whoop_dashboard_settings.json";

    fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(Self::FILE))
    }

    fn load() -> Self {
        if let Some(path) = Self::path() {
            if let Ok(data) = std::fs::read_to_string(&path) {
                if let Ok(cfg) = serde_json::from_str(&data) {
                    return cfg;
                }
            }
        }
        Self::default()
    }

    fn save(&self) {
        if let Some(path) = Self::path() {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(data) = serde_json::to_string_pretty(self) {
                if let Err(e) = std::fs::write(&path, data) {
                    log::error!("Failed to save settings to {}: {e}", path.display());
                }
            }
        }
    }

    fn snapshot_sink(&self) -> Option<SnapshotSink> {
        self.save_snapshot.then(|| {
            SnapshotSink::new(
                self.snapshot_dir
                    .as_deref()
                    .filter(|d| !d.is_empty())
                    .unwrap_or("."),
            )
        })
    }

    fn query_options(&self) -> QueryOptions {
        QueryOptions {
            kind: self.record_kind,
            exclude_today: self.exclude_today,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            layout: Layout::PresetBar,
            record_kind: RecordKind::Workouts,
            preset: Preset::Last7Days,
            date_input: default_date_input(),
            custom_start: None,
            custom_end: None,
            exclude_today: false,
            save_snapshot: true,
            snapshot_dir: None,
            page_size: 10,
        }
    }
}

fn build_dashboard(settings: &Settings) -> Dashboard {
    let source = credentials_from_env()
        .map(|creds| FetchAdapter::new(WhoopClient::new(creds), settings.snapshot_sink()));
    if let Err(e) = &source {
        log::warn!("Whoop credentials unavailable: {e}");
    }
    Dashboard::new(source)
}

/// What the user asked for during the current frame.
enum Trigger {
    DateInput,
    Selection(RangeSelection),
}

struct DashboardApp {
    dashboard: Dashboard,
    settings: Settings,
    outcome: QueryOutcome,
    /// Selection behind the current outcome, used to highlight the active preset.
    active: Option<RangeSelection>,
    /// Default selection that runs on the first frame.
    pending: Option<RangeSelection>,
    page: usize,
    show_settings: bool,
    settings_dirty: bool,
}

impl DashboardApp {
    fn new(settings: Settings) -> Self {
        let dashboard = build_dashboard(&settings);
        let pending = settings.layout.default_selection();
        Self {
            dashboard,
            settings,
            outcome: QueryOutcome::default(),
            active: None,
            pending,
            page: 0,
            show_settings: false,
            settings_dirty: false,
        }
    }

    fn today() -> NaiveDate {
        local_today()
    }

    fn execute(&mut self, trigger: Trigger) {
        let options = self.settings.query_options();
        let today = Self::today();
        self.outcome = match trigger {
            Trigger::DateInput => {
                self.active = None;
                self.dashboard
                    .submit_date(&self.settings.date_input, options, today)
            }
            Trigger::Selection(selection) => {
                if let RangeSelection::Preset(p) = selection {
                    self.settings.preset = p;
                    self.settings_dirty = true;
                }
                self.active = Some(selection);
                self.dashboard.run(Some(selection), options, today)
            }
        };
        self.page = 0;
        info!("{}", self.outcome.message);
    }

    fn switch_layout(&mut self, layout: Layout) {
        self.settings.layout = layout;
        self.outcome = QueryOutcome::default();
        self.active = None;
        self.pending = layout.default_selection();
        self.settings_dirty = true;
    }

    fn page_count(&self) -> usize {
        let size = self.settings.page_size.max(1);
        self.outcome.view.rows.len().div_ceil(size).max(1)
    }

    fn export_table(&self) {
        let Some(path) = FileDialog::new()
            .add_filter("CSV", &["csv"])
            .add_filter("JSON", &["json"])
            .save_file()
        else {
            return;
        };
        let view = &self.outcome.view;
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
        {
            Some(ext) if ext == "json" => {
                if let Err(e) = save_rows_json(&path, &view.rows) {
                    log::error!("Failed to export table: {e}");
                }
            }
            _ => {
                if let Err(e) = save_rows_csv(&path, &view.columns, &view.rows) {
                    log::error!("Failed to export table: {e}");
                }
            }
        }
    }

    fn export_report(&self) {
        let Some(path) = FileDialog::new().add_filter("HTML", &["html"]).save_file() else {
            return;
        };
        let title = format!("Whoop {}", capitalize(self.settings.record_kind.noun()));
        match export_html_report(&path, &title, &self.outcome.view) {
            Ok(()) => {
                if let Err(e) = open::that(&path) {
                    log::error!("Failed to open report {}: {e}", path.display());
                }
            }
            Err(e) => log::error!("Failed to export report: {e}"),
        }
    }

    fn range_panel(&mut self, ui: &mut egui::Ui, trigger: &mut Option<Trigger>) {
        ui.heading("Range");
        for preset in Preset::ALL {
            let selected = self.active == Some(RangeSelection::Preset(preset));
            if ui.selectable_label(selected, preset.label()).clicked() {
                *trigger = Some(Trigger::Selection(RangeSelection::Preset(preset)));
            }
        }
        ui.separator();
        ui.label("Custom range");
        let today = Self::today();
        let mut start = self
            .settings
            .custom_start
            .unwrap_or_else(|| today.checked_sub_days(Days::new(7)).unwrap_or(today));
        let mut end = self.settings.custom_end.unwrap_or(today);
        ui.horizontal(|ui| {
            ui.label("Start:");
            if ui
                .add(DatePickerButton::new(&mut start).id_source("custom_start"))
                .changed()
            {
                self.settings.custom_start = Some(start);
                self.settings_dirty = true;
            }
        });
        ui.horizontal(|ui| {
            ui.label("End:");
            if ui
                .add(DatePickerButton::new(&mut end).id_source("custom_end"))
                .changed()
            {
                self.settings.custom_end = Some(end);
                self.settings_dirty = true;
            }
        });
        let custom = RangeSelection::Custom { start, end };
        if ui
            .selectable_label(self.active == Some(custom), "Apply custom range")
            .clicked()
        {
            *trigger = Some(Trigger::Selection(custom));
        }
    }

    fn draw_table(&mut self, ui: &mut egui::Ui) {
        let view = &self.outcome.view;
        if view.rows.is_empty() {
            return;
        }
        let pages = self.page_count();
        self.page = self.page.min(pages - 1);
        ui.horizontal(|ui| {
            if ui.add_enabled(self.page > 0, egui::Button::new("< Prev")).clicked() {
                self.page -= 1;
            }
            ui.label(format!("Page {} of {}", self.page + 1, pages));
            if ui
                .add_enabled(self.page + 1 < pages, egui::Button::new("Next >"))
                .clicked()
            {
                self.page += 1;
            }
        });
        let size = self.settings.page_size.max(1);
        let view = &self.outcome.view;
        let start = self.page * size;
        let rows = &view.rows[start..(start + size).min(view.rows.len())];
        let row_height = ui.text_style_height(&egui::TextStyle::Body);
        egui::ScrollArea::horizontal()
            .id_source("table_scroll")
            .show(ui, |ui| {
                egui_extras::TableBuilder::new(ui)
                    .striped(true)
                    .resizable(true)
                    .columns(egui_extras::Column::auto(), view.columns.len())
                    .header(row_height, |mut header| {
                        for col in &view.columns {
                            header.col(|ui| {
                                ui.strong(&col.name);
                            });
                        }
                    })
                    .body(|mut body| {
                        for r in rows {
                            body.row(row_height, |mut row| {
                                for cell in r.cells() {
                                    row.col(|ui| {
                                        ui.label(cell.to_string());
                                    });
                                }
                            });
                        }
                    });
            });
    }

    fn draw_chart(&self, ui: &mut egui::Ui) {
        let points: Vec<[f64; 2]> = self
            .outcome
            .view
            .series
            .iter()
            .map(|p| [p.day_value(), p.strain])
            .collect();
        ui.heading("Strain Score Over Time");
        Plot::new("strain_plot")
            .height(300.0)
            .x_axis_label("Date")
            .y_axis_label("Strain Score")
            .x_axis_formatter(|mark, _chars, _| day_label(mark.value))
            .legend(Legend::default())
            .show(ui, |plot_ui| {
                plot_ui.line(Line::new(PlotPoints::from(points.clone())).name("Strain Score"));
                plot_ui.points(Points::new(points).radius(3.0).name("Strain Score"));
            });
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        let mut open = self.show_settings;
        let mut new_layout = None;
        let mut rebuild = false;
        egui::Window::new("Settings").open(&mut open).show(ctx, |ui| {
            egui::Grid::new("settings_grid").num_columns(2).show(ui, |ui| {
                ui.label("Layout:");
                egui::ComboBox::from_id_source("layout_setting")
                    .selected_text(self.settings.layout.label())
                    .show_ui(ui, |ui| {
                        for layout in Layout::ALL {
                            if ui
                                .selectable_label(self.settings.layout == layout, layout.label())
                                .clicked()
                                && self.settings.layout != layout
                            {
                                new_layout = Some(layout);
                            }
                        }
                    });
                ui.end_row();

                ui.label("Records:");
                egui::ComboBox::from_id_source("kind_setting")
                    .selected_text(capitalize(self.settings.record_kind.noun()))
                    .show_ui(ui, |ui| {
                        for kind in [RecordKind::Workouts, RecordKind::Cycles] {
                            if ui
                                .selectable_value(
                                    &mut self.settings.record_kind,
                                    kind,
                                    capitalize(kind.noun()),
                                )
                                .changed()
                            {
                                self.settings_dirty = true;
                            }
                        }
                    });
                ui.end_row();

                ui.label("Rows per page:");
                if ui
                    .add(egui::DragValue::new(&mut self.settings.page_size).clamp_range(1..=100))
                    .changed()
                {
                    self.settings_dirty = true;
                }
                ui.end_row();

                ui.label("Hide today's records:");
                if ui.checkbox(&mut self.settings.exclude_today, "").changed() {
                    self.settings_dirty = true;
                }
                ui.end_row();

                ui.label("Save raw snapshot:");
                if ui.checkbox(&mut self.settings.save_snapshot, "").changed() {
                    self.settings_dirty = true;
                    rebuild = true;
                }
                ui.end_row();

                ui.label("Snapshot directory:");
                let mut dir = self.settings.snapshot_dir.clone().unwrap_or_default();
                if ui
                    .add(egui::TextEdit::singleline(&mut dir).hint_text("."))
                    .lost_focus()
                {
                    let dir = (!dir.trim().is_empty()).then(|| dir.trim().to_string());
                    if dir != self.settings.snapshot_dir {
                        self.settings.snapshot_dir = dir;
                        self.settings_dirty = true;
                        rebuild = true;
                    }
                }
                ui.end_row();
            });
        });
        self.show_settings = open;
        if let Some(layout) = new_layout {
            self.switch_layout(layout);
        }
        if rebuild {
            self.dashboard = build_dashboard(&self.settings);
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        let mut trigger = self.pending.take().map(Trigger::Selection);

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Settings").clicked() {
                        self.show_settings = true;
                        ui.close_menu();
                    }
                    if ui.button("Export Table").clicked() {
                        self.export_table();
                        ui.close_menu();
                    }
                    if ui.button("Export Report").clicked() {
                        self.export_report();
                        ui.close_menu();
                    }
                });
            });
        });

        egui::TopBottomPanel::top("title_bar").show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading(format!(
                    "Whoop {} Fetcher",
                    capitalize(self.settings.record_kind.noun())
                ));
            });
            if self.settings.layout == Layout::SingleDate {
                ui.horizontal(|ui| {
                    let resp = ui.add(
                        egui::TextEdit::singleline(&mut self.settings.date_input)
                            .hint_text("YYYY-MM-DD")
                            .desired_width(300.0),
                    );
                    if resp.changed() {
                        self.settings_dirty = true;
                    }
                    let label = format!("Fetch {}", capitalize(self.settings.record_kind.noun()));
                    if ui.button(label).clicked() {
                        trigger = Some(Trigger::DateInput);
                    }
                });
            }
        });

        if self.settings.layout != Layout::SingleDate {
            egui::SidePanel::left("range_panel").show(ctx, |ui| {
                self.range_panel(ui, &mut trigger);
            });
        }

        if let Some(t) = trigger {
            self.execute(t);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                if !self.outcome.message.is_empty() {
                    ui.vertical_centered(|ui| {
                        ui.label(&self.outcome.message);
                    });
                    ui.separator();
                }
                if self.settings.layout != Layout::ChartOnly {
                    self.draw_table(ui);
                    ui.separator();
                }
                self.draw_chart(ui);
            });
        });

        if self.show_settings {
            self.settings_window(ctx);
        }

        if self.settings_dirty {
            self.settings.save();
            self.settings_dirty = false;
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.settings.save();
    }
}

fn main() -> eframe::Result<()> {
    let dotenv = dotenvy::dotenv();
    env_logger::init();
    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => log::warn!("Failed to read .env file: {e}"),
    }
    let settings = Settings::load();
    let options = NativeOptions::default();
    eframe::run_native(
        "Whoop Workouts Dashboard",
        options,
        Box::new(|_cc| Box::new(DashboardApp::new(settings))),
    )
}
