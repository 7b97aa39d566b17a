/// Builds the channel topic/purpose from the service type and event titles.
///
/// `"<service>"`, `"<service> - <title>"`, `"<service> - <series>"` or
/// `"<service> - <series> (<title>)"` depending on which titles are present.
pub fn compose_channel_topic(service_type_name: &str, series_title: &str, title: &str) -> String {
    let series_title = series_title.trim();
    let title = title.trim();
    match (series_title.is_empty(), title.is_empty()) {
        (true, true) => service_type_name.to_string(),
        (true, false) => format!("{service_type_name} - {title}"),
        (false, true) => format!("{service_type_name} - {series_title}"),
        (false, false) => format!("{service_type_name} - {series_title} ({title})"),
    }
}
