/// Colours and sizes used when panels draw their chrome.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartTheme {
    pub background: String,
    pub axis_line: String,
    pub axis_label: String,
    pub axis_label_size: f64,
    pub tick_size: f64,
    pub tick_label: String,
    pub tick_label_size: f64,
    pub title_size: f64,
    pub curtain_background: String,
    pub curtain_text: String,
    pub loader_text: String,
    pub point_fill: String,
    pub point_size: f64,
}

impl Default for ChartTheme {
    fn default() -> Self {
        Self {
            background: "#ffffff".into(),
            axis_line: "#333333".into(),
            axis_label: "#333333".into(),
            axis_label_size: 12.0,
            tick_size: 6.0,
            tick_label: "#333333".into(),
            tick_label_size: 10.0,
            title_size: 18.0,
            curtain_background: "rgba(216, 216, 216, 0.85)".into(),
            curtain_text: "#d43f3a".into(),
            loader_text: "#555555".into(),
            point_fill: "#888888".into(),
            point_size: 40.0,
        }
    }
}
